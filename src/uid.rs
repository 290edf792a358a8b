use uuid::Uuid;

/// Source of globally unique DICOM UIDs.
pub trait UidGenerator: Send + Sync {
    fn new_uid(&self) -> String;
}

/// Generates UUID-derived UIDs under the `2.25` root (PS3.5 B.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomUidGenerator;

impl UidGenerator for DicomUidGenerator {
    fn new_uid(&self) -> String {
        format!("2.25.{}", Uuid::new_v4().as_u128())
    }
}
