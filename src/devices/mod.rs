pub mod gem;
pub mod riemann;

pub use gem::{open_replay, open_serial, open_source};
pub use riemann::RiemannClient;
