use thiserror::Error;

use crate::DxError;

/// Errors of the ambient-occlusion layer. Device failures keep the failing
/// call and its location from `DxError`.
#[derive(Debug, Error)]
pub enum AoError {
    #[error(transparent)]
    Device(#[from] DxError),

    #[error("blur radius {radius} exceeds the maximum of {max}")]
    BlurRadius { radius: u32, max: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0} is not initialized")]
    NotInitialized(&'static str),
}

pub type AoResult<T> = Result<T, AoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::E_OUTOFMEMORY;

    #[test]
    fn device_errors_keep_their_call_site() {
        let error: AoError = DxError::new("CreateHeap", E_OUTOFMEMORY).into();
        let message = error.to_string();
        assert!(message.starts_with("CreateHeap failed"), "{}", message);
    }

    #[test]
    fn blur_radius_message_names_both_values() {
        let error = AoError::BlurRadius { radius: 8, max: 5 };
        assert_eq!(
            error.to_string(),
            "blur radius 8 exceeds the maximum of 5"
        );
    }
}
