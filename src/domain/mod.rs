//! Domain layer: the integration request lifecycle, its events, and the ports the
//! application layer drives. Nothing in here performs I/O.

pub mod events;
pub mod ports;
pub mod request;
