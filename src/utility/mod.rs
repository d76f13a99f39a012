use coaster as co;

use co::prelude::*;
use env_logger::Env;
use itertools::Itertools;

use crate::error::{Result, VxError};

pub fn get_native_backend() -> Result<Backend<Native>> {
    Backend::<Native>::default().map_err(|e| VxError::BackendResourceExhausted {
        call: "native_backend",
        reason: format!("{:?}", e),
    })
}

/// Installs `env_logger` with an `info` default. `RUST_LOG` overrides it.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
}

/// `[a, b, c]` rendered as `a x b x c` for log lines.
pub(crate) fn shape_str(shape: &[usize]) -> String {
    shape.iter().join(" x ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_formatting() {
        assert_eq!(shape_str(&[3, 1, 4]), "3 x 1 x 4");
        assert_eq!(shape_str(&[]), "");
    }

    #[test]
    fn native_backend_is_available() {
        init_logging();
        assert!(get_native_backend().is_ok());
    }
}
