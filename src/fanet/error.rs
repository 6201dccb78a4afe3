#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("frame shorter than its type requires")]
    ShortFrame,
    #[error("unknown packet type")]
    UnknownType,
    #[error("coordinate outside -90..90 / -180..180")]
    CoordOutOfRange,
    #[error("topic packet type does not match header packet type")]
    TypeMismatch,
}
