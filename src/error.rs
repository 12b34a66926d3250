//! Application error type.
//!
//! One error type for the whole pipeline, carrying the process exit code:
//! 2 = invalid input or configuration, 3 = insufficient calibration data,
//! 4 = numerical degeneracy or internal invariant violation.

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Invalid input or configuration (exit code 2).
    pub fn input(message: impl Into<String>) -> Self {
        Self::new(2, message)
    }

    /// Insufficient calibration data (exit code 3).
    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(3, message)
    }

    /// Numerical degeneracy or violated internal invariant (exit code 4).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(4, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_carry_their_exit_codes() {
        assert_eq!(AppError::input("bad flag").exit_code(), 2);
        assert_eq!(AppError::insufficient("one cluster").exit_code(), 3);
        assert_eq!(AppError::internal("nan in grid").exit_code(), 4);
        assert_eq!(format!("{}", AppError::input("bad flag")), "bad flag");
    }
}
