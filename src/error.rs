use thiserror::Error;

/// Result type used throughout this crate.
pub type Result<T, E = GeoError> = std::result::Result<T, E>;

/// Everything that can go wrong when building, converting, or combining coordinate arrays.
///
/// All of these are deterministic client errors: retrying the same call with the same inputs
/// will fail the same way.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    /// The requested system is not registered for this array family.
    #[error("unknown {family} system '{system}', use one of: {}", valid.join(", "))]
    UnknownSystem {
        family: &'static str,
        system: String,
        valid: Vec<String>,
    },

    /// Both systems are registered, but no chain of conversions links them.
    #[error("no conversion of {family} from '{from}' to '{to}'")]
    UnknownConversion {
        family: &'static str,
        from: String,
        to: String,
    },

    /// A system name is already registered with another column layout.
    #[error("{family} system '{system}' is already registered as {registered}, cannot redefine it as {requested}")]
    SystemRedefined {
        family: &'static str,
        system: String,
        registered: String,
        requested: String,
    },

    /// Values do not have the column count of their system.
    #[error("{type_name} in system '{system}' needs {expected} columns, got {rows}x{columns}")]
    ShapeMismatch {
        type_name: &'static str,
        system: String,
        expected: usize,
        rows: usize,
        columns: usize,
    },

    /// Values handed to a constructor include NaN or an infinity.
    #[error("{type_name} values must be finite, got {value} at row {row}, column {column}")]
    NonFiniteValue {
        type_name: &'static str,
        row: usize,
        column: usize,
        value: f64,
    },

    /// Two arrays with incompatible numbers of observations met in one operation.
    #[error("{operation}: cannot combine {left} observations with {right} observations")]
    LengthMismatch {
        operation: &'static str,
        left: usize,
        right: usize,
    },

    /// The operation is not defined for these operand types (eg, position + position).
    #[error("unsupported operand types for {operation}: {left} and {right}")]
    UndefinedOperation {
        operation: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// A field needs an attribute (like `other`) that has not been set.
    #[error("{attribute} is not defined for {type_name}")]
    MissingAttribute {
        type_name: &'static str,
        attribute: &'static str,
    },

    /// Name resolution found neither a system, a column, a derived field, nor an attribute.
    #[error("{type_name} has no attribute '{key}'")]
    AttributeNotFound { type_name: &'static str, key: String },

    /// An extension attribute value does not fit the array it was attached to.
    #[error("attribute '{attribute}' has {got} values, but the array has {expected} observations")]
    InvalidAttributeValue {
        attribute: String,
        expected: usize,
        got: usize,
    },

    /// No ellipsoid with this name is known.
    #[error("unknown ellipsoid '{name}', use one of: {}", valid.join(", "))]
    UnknownEllipsoid { name: String, valid: Vec<String> },
}
