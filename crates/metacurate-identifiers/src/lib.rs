//! External identifier registry.
//!
//! Each scheme exposes deterministic [`normalise`](Scheme::normalise),
//! pure-regex [`syntax_ok`](Scheme::syntax_ok) and, where the scheme defines
//! one, [`check_digit`](Scheme::check_digit) validation. The [`Registry`]
//! bundles these behind a memoised [`is_valid`](Registry::is_valid) and can
//! optionally consult the network through a [`probe::ProbeClient`].

pub mod checksum;
pub mod probe;
pub mod registry;
pub mod scheme;

pub use probe::{ProbeClient, ProbeError};
pub use registry::Registry;
pub use scheme::Scheme;
