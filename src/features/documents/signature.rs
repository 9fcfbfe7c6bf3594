//! Identity key used to detect re-selection of the same file.

/// Opaque dedup key; compared for equality only and never exposed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

/// Join name, size and last-modified time into a signature.
///
/// No validation happens here, any input is joined as-is.
pub fn signature(name: &str, size: u64, last_modified: i64) -> Signature {
    Signature(format!("{}-{}-{}", name, size, last_modified))
}
