// Domain layer: data model and ports. Readers, fitting and storage build on these types.

pub mod model;
pub mod ports;
