use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("No image found for tag '{tag}' at date {date}")]
    NotFound { tag: String, date: i32 },
    #[error("Image type error: {0}")]
    ImageType(String),
    #[error("{}: sizes do not match ({}x{}) <-> ({}x{})", .what, .size1.0, .size1.1, .size2.0, .size2.1)]
    SizeMismatch {
        size1: (usize, usize),
        size2: (usize, usize),
        what: String,
    },
    #[error("File format error: {0}")]
    FileFormat(String),
    #[error("Logic error: {0}")]
    Logic(String),
}

impl Error {
    pub fn size_mismatch(what: impl Into<String>, size1: (usize, usize), size2: (usize, usize)) -> Self {
        Error::SizeMismatch {
            size1,
            size2,
            what: what.into(),
        }
    }

    pub fn not_found(tag: impl Into<String>, date: i32) -> Self {
        Error::NotFound { tag: tag.into(), date }
    }
}
