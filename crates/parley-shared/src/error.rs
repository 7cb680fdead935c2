use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Invalid image file: {0}")]
    InvalidFile(String),

    #[error("Invalid compression options: {0}")]
    InvalidOptions(String),

    #[error("Failed to read image file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    #[error("Sender id is required")]
    MissingSender,

    #[error("Message text is required")]
    EmptyText,

    #[error("Image content is required")]
    EmptyImage,
}
