//! Nuclide identities and their mapping onto DRAGLIB naming.
//!
//! - [`identity`] parses domain nuclide names (`U235`, `AM242M`, `LFP35`) into typed identities.
//! - [`library_id`] maps identities onto the DRAGLIB isotope names used in decks.
//! - [`thermal`] resolves which nuclides of a unit are bound to a thermal-scattering law.

pub mod identity;
pub mod library_id;
pub mod thermal;
