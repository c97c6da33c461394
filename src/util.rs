mod width_vec;

pub use width_vec::*;
