use thiserror::Error;

#[derive(Error, Debug)]
pub enum MsdaError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Shape mismatch for {name}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Level cells cover {covered} keys but the feature store has {keys}")]
    KeyCountMismatch { covered: usize, keys: usize },

    #[error("Level {level} spans keys [{start}, {end}) outside the feature store of {keys} keys")]
    LevelOutOfRange {
        level: usize,
        start: usize,
        end: usize,
        keys: usize,
    },

    #[error("Level {level} starts at key {start}, before the previous level ends at {previous_end}")]
    LevelOverlap {
        level: usize,
        start: usize,
        previous_end: usize,
    },

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MsdaError>;
