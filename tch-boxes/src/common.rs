pub use anyhow::{bail, ensure, format_err, Error, Result};
pub use std::convert::{TryFrom, TryInto};
pub use tch::{Device, IndexOp, Kind, Tensor};
