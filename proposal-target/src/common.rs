pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use getset::Getters;
pub use itertools::{chain, izip, Itertools as _};
pub use log::warn;
pub use rand::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    cmp,
    convert::{TryFrom, TryInto},
};
pub use tch::{Device, IndexOp, Kind, Tensor};
pub use tch_tensor_like::TensorLike;
