use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0} not found in apk")]
    MissingEntry(String),

    #[error("decode error: {0}")]
    Codec(#[from] resparse_codec::CodecError),
}

pub type ApkResult<T> = Result<T, ApkError>;
