use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    /// A raw read or write of `len` bytes at `address` was rejected by the OS.
    pub fn access(address: u64, len: usize, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Access {
                address,
                len,
                source,
            }
            .into(),
        )
    }

    /// The allocator could not produce a region (no OS error involved).
    pub fn allocator(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Allocator {
                message: message.into(),
                source: None,
            }
            .into(),
        )
    }

    /// The OS refused to reserve or release a region.
    pub fn allocator_os(message: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Allocator {
                message: message.into(),
                source: Some(source),
            }
            .into(),
        )
    }

    pub fn unsupported(name: impl Into<String>) -> Error {
        Error(ErrorKind::UnsupportedOperation { name: name.into() }.into())
    }

    pub fn invalid_format(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: element.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn is_access(&self) -> bool {
        matches!(self.kind(), ErrorKind::Access { .. })
    }

    pub fn is_allocator(&self) -> bool {
        matches!(self.kind(), ErrorKind::Allocator { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.kind(), ErrorKind::UnsupportedOperation { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("failed to access {len} bytes at {address:#x}: {source}")]
    Access {
        address: u64,
        len: usize,
        source: std::io::Error,
    },

    #[error("allocation failed: {message}{}",
        .source.as_ref().map(|e| format!(" ({e})")).unwrap_or_default())]
    Allocator {
        message: String,
        source: Option<std::io::Error>,
    },

    #[error("unsupported operation {name}")]
    UnsupportedOperation { name: String },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid data for '{element}': {message}")]
    InvalidFormat { element: String, message: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
