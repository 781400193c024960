use thiserror::Error;

use crate::transform::Identifier;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants are grouped by where they originate: decoding and encoding of class files,
/// execution of transform rules and their collaborators, and the surrounding infrastructure
/// (configuration, filesystem, synchronization).
///
/// # Error Categories
///
/// ## Class File Errors
/// - [`Error::Malformed`] - Corrupted or invalid class file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the class bytes
/// - [`Error::NotSupported`] - Class file version or construct the codec can not handle
/// - [`Error::Encoding`] - A decoded class can not be written back (e.g. branch overflow)
///
/// ## Transformation Errors
/// - [`Error::RuleFailed`] - A transform rule aborted the transformation of a class
/// - [`Error::Transform`] - Failure reported by a collaborator (mandatory transform, cache, sink)
///
/// ## Infrastructure Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Config`] - Configuration could not be parsed or written
/// - [`Error::LockError`] - Thread synchronization failure
///
/// # Examples
///
/// ```rust
/// use classweave::{classfile::ClassReader, Error};
///
/// match ClassReader::new(&[0xCA, 0xFE]) {
///     Ok(_) => println!("parsed"),
///     Err(Error::OutOfBounds) => println!("truncated class file"),
///     Err(Error::Malformed { message, .. }) => println!("malformed: {}", message),
///     Err(e) => println!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Class file errors
    /// The class file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the class bytes.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The class file uses a version or construct that is not supported.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// A decoded class can not be encoded back into the class file format.
    ///
    /// Typical causes are branch offsets that no longer fit into their encoding after
    /// a rule grew a method body, or labels that are referenced but never placed.
    #[error("Encoding failed - {0}")]
    Encoding(String),

    // Transformation errors
    /// A transform rule failed while rewriting a class.
    ///
    /// The class that was being transformed fails to load; no partially rewritten
    /// bytecode is ever returned.
    #[error("Transform rule {rule} failed: {source}")]
    RuleFailed {
        /// Identifier of the failing rule
        rule: Identifier,
        /// The error the rule reported
        #[source]
        source: Box<Error>,
    },

    /// Generic failure reported by a transform rule or an external collaborator.
    #[error("{0}")]
    Transform(String),

    // Infrastructure errors
    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The configuration could not be read or written.
    #[error("Configuration error - {0}")]
    Config(String),

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically
    /// when trying to acquire a mutex or rwlock that is in an invalid state.
    #[error("Failed to lock target")]
    LockError,
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(error: toml::ser::Error) -> Self {
        Error::Config(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_carries_location() {
        let error = malformed_error!("bad tag {}", 42);
        match error {
            Error::Malformed {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "bad tag 42");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            _ => panic!("Expected Error::Malformed"),
        }
    }

    #[test]
    fn rule_failure_names_rule() {
        let error = Error::RuleFailed {
            rule: Identifier::new("demo", "strip"),
            source: Box::new(Error::Transform("boom".to_string())),
        };
        assert_eq!(error.to_string(), "Transform rule demo:strip failed: boom");
    }
}
