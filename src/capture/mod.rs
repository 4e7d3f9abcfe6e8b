/// The `capture` module turns captured photos into provider payloads.
/// Camera access and permissions live in the host app; this side only sees
/// a file path.
pub mod frame;
