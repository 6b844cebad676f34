//! Unit tests for the resource version checkpoint

#[cfg(test)]
mod tests {
    use crate::checkpoint::{Checkpoint, CheckpointRecord};
    use crate::error::ControllerError;

    #[tokio::test]
    async fn test_missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new(dir.path(), "bb34050b10", "pods.v1");
        assert_eq!(checkpoint.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new(&dir.path().join("state"), "bb34050b10", "pods.v1");

        checkpoint.save(Some("1234")).await.unwrap();
        assert_eq!(checkpoint.load().await.unwrap().as_deref(), Some("1234"));
        assert!(checkpoint.path().ends_with("state/bb34050b10.json"));

        // A purge is persisted too
        checkpoint.save(None).await.unwrap();
        assert_eq!(checkpoint.load().await.unwrap(), None);

        let record: CheckpointRecord =
            serde_json::from_slice(&std::fs::read(checkpoint.path()).unwrap()).unwrap();
        assert_eq!(record.cache_id, "bb34050b10");
        assert_eq!(record.resource, "pods.v1");
    }

    #[tokio::test]
    async fn test_foreign_checkpoint_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bb34050b10.json");
        std::fs::write(&path, r#"{"cacheId":"3399be49e5","resourceVersion":"99"}"#).unwrap();

        let checkpoint = Checkpoint::new(dir.path(), "bb34050b10", "pods.v1");
        assert_eq!(checkpoint.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bb34050b10.json"), "not json").unwrap();

        let checkpoint = Checkpoint::new(dir.path(), "bb34050b10", "pods.v1");
        let err = checkpoint.load().await.unwrap_err();
        assert!(matches!(err, ControllerError::CheckpointDecode(_)));
    }
}
