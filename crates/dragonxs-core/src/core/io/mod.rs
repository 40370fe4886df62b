pub mod composition_file;
