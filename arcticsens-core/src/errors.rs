use thiserror::Error;

/// Error type for index computations over model output.
#[derive(Error, Debug)]
pub enum ArcticError {
    #[error("{0}")]
    Error(String),
    #[error("Unrecognized grid dimensions for model {model}: {dims:?}. Expected one of x/y, ni/nj, nlon/nlat, longitude/latitude, lon/lat or i/j")]
    UnrecognizedDimensions { model: String, dims: Vec<String> },
    #[error("Coordinate '{name}' is missing")]
    MissingCoordinate { name: String },
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("No cell-area field found for model {model}")]
    MissingCellArea { model: String },
    #[error("Unknown units for {quantity}: '{units}'")]
    UnknownUnits { quantity: String, units: String },
    #[error("Time axis mixes representations or calendars: {0}")]
    MixedTimeRepresentation(String),
    #[error("Invalid calendar month {0}, expected 1-12")]
    InvalidMonth(u32),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("No grid cells at or north of {min_lat} degrees")]
    EmptyRegion { min_lat: f64 },
    #[error("Cannot regress month {month}: {samples} usable samples")]
    DegenerateRegression { month: u32, samples: usize },
    #[error("Variable '{variable}' is missing for model {model}")]
    MissingVariable { variable: String, model: String },
    #[error("Variable '{variable}' already exists for model {model}")]
    DuplicateVariable { variable: String, model: String },
    #[error("No ensemble members left for model {model} after filtering")]
    NoMembers { model: String },
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

/// Convenience type for `Result<T, ArcticError>`.
pub type ArcticResult<T> = Result<T, ArcticError>;
