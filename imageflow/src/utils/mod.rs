//! Small helpers for generated labels and timestamps.

mod labels;

pub use labels::{
    default_image_label, default_instance_label, iso_timestamp, Timestamp, LABEL_PREFIX,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }
}
