//! Index pipeline: vault objects → embedding vectors → document store.
//!
//! The desired set is a full vault scan every round. Dedup is keyed by
//! payload ([`DocId`]), so it cannot be computed before dispatch: each
//! worker hashes its file first, asks the document store whether that
//! digest is already indexed, and only then pays for the read and the
//! encoder call. The store's create-if-absent put makes a lost race or a
//! restarted round a safe no-op.

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use snapvault_encoder::Encoder;
use snapvault_runtime::{ItemOutcome, PoolConfig, RoundReport, WorkerPool, run_convergence};
use snapvault_shared::{DocId, IndexConfig, Result, SnapvaultError};
use snapvault_store::{ImageDocument, PutOutcome, SearchIndex, Vault};

/// Long-lived index pipeline instance.
pub struct IndexPipeline {
    vault: Vault,
    encoder: Encoder,
    index: SearchIndex,
    pool: WorkerPool,
    interval: Duration,
}

impl IndexPipeline {
    /// Build the pipeline and provision the remote index.
    ///
    /// Startup probes the encoder for its vector dimensionality and
    /// creates the index mapping with it; an unreachable collaborator
    /// here fails the process, matching the fatal-at-startup-only rule.
    pub async fn new(config: &IndexConfig, encoder: Encoder, index: SearchIndex) -> Result<Self> {
        let vault = Vault::open(&config.vault_dir)?;

        index.ping().await?;
        let caps = encoder.info().await?;
        info!(model = %caps.model, dims = caps.dims, "encoder ready");
        index.ensure_index(caps.dims).await?;

        let pool = WorkerPool::new(PoolConfig {
            concurrency: config.concurrency,
            // The encoder client already bounds each call with its own
            // timeout and retry budget.
            item_timeout: None,
        })?;

        Ok(Self {
            vault,
            encoder,
            index,
            pool,
            interval: Duration::from_secs(config.poll_seconds),
        })
    }

    /// One convergence round over everything currently in the vault.
    #[instrument(skip_all, fields(vault = %self.vault.root().display()))]
    pub async fn run_round(&self) -> Result<RoundReport> {
        let files = self.vault.scan()?;
        debug!(candidates = files.len(), "scanned vault");

        let encoder = self.encoder.clone();
        let index = self.index.clone();
        let report = self
            .pool
            .run(files, move |file: PathBuf| {
                let encoder = encoder.clone();
                let index = index.clone();
                async move { index_one(&encoder, &index, file).await }
            })
            .await;

        Ok(report)
    }

    /// Run rounds forever, sleeping `poll_seconds` between them, until
    /// `shutdown` flips true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        run_convergence("index", self.interval, shutdown, || self.run_round()).await;
    }
}

/// Hash, dedup-check, embed, and index a single vault object.
async fn index_one(encoder: &Encoder, index: &SearchIndex, file: PathBuf) -> Result<ItemOutcome> {
    let mut handle = std::fs::File::open(&file).map_err(|e| SnapvaultError::io(&file, e))?;

    // Stream the digest before deciding anything; the payload is the
    // dedup key, not the filename.
    let id = DocId::from_reader(&mut handle).map_err(|e| SnapvaultError::io(&file, e))?;

    if index.exists(&id).await? {
        return Ok(ItemOutcome::Skipped);
    }

    handle
        .seek(SeekFrom::Start(0))
        .map_err(|e| SnapvaultError::io(&file, e))?;
    let mut bytes = Vec::new();
    handle
        .read_to_end(&mut bytes)
        .map_err(|e| SnapvaultError::io(&file, e))?;

    let vector = encoder.encode_image(&bytes).await?;

    let doc = ImageDocument {
        path: file.display().to_string(),
        vector,
        indexed_at: Utc::now(),
    };

    match index.put(&id, &doc).await? {
        PutOutcome::Created => Ok(ItemOutcome::Written),
        PutOutcome::AlreadyPresent => Ok(ItemOutcome::Skipped),
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use wiremock::matchers::{body_partial_json, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use snapvault_shared::{EncoderConfig, SearchIndexConfig};

    use super::*;

    async fn mount_encoder(server: &MockServer, dims: usize) {
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "clip-vit-l14",
                "dims": dims
            })))
            .mount(server)
            .await;
    }

    async fn mount_index_creation(server: &MockServer) {
        Mock::given(method("PUT"))
            .and(path("/images"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    fn encoder_for(server: &MockServer) -> Encoder {
        Encoder::new(&EncoderConfig {
            endpoint: server.uri(),
            request_timeout_secs: 5,
            max_retries: 1,
        })
        .expect("build encoder")
    }

    fn search_index_for(server: &MockServer) -> SearchIndex {
        SearchIndex::new(&SearchIndexConfig {
            host: server.uri(),
            index: "images".into(),
            request_timeout_secs: 5,
            knn_candidates: 100,
            top_k: 10,
        })
        .expect("build search index")
    }

    fn index_config(vault_dir: &std::path::Path) -> IndexConfig {
        IndexConfig {
            vault_dir: vault_dir.display().to_string(),
            concurrency: 1,
            poll_seconds: 30,
        }
    }

    #[tokio::test]
    async fn startup_provisions_index_with_discovered_dims() {
        let server = MockServer::start().await;
        mount_encoder(&server, 512).await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/images"))
            .and(body_partial_json(serde_json::json!({
                "mappings": { "properties": { "vector": { "dims": 512 } } }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        IndexPipeline::new(
            &index_config(dir.path()),
            encoder_for(&server),
            search_index_for(&server),
        )
        .await
        .expect("pipeline startup");
    }

    #[tokio::test]
    async fn duplicate_payloads_produce_one_document() {
        let server = MockServer::start().await;
        mount_encoder(&server, 3).await;
        mount_index_creation(&server).await;

        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("first.jpg"), b"same bytes").expect("write");
        std::fs::write(dir.path().join("second.jpg"), b"same bytes").expect("write");

        let id = DocId::from_bytes(b"same bytes");

        // First lookup misses, every later one hits.
        Mock::given(method("HEAD"))
            .and(path(format!("/images/_doc/{id}")))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path(format!("/images/_doc/{id}")))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        // The duplicate must be skipped before any expensive work.
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vector": [0.1, 0.2, 0.3]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("/images/_create/{id}")))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = IndexPipeline::new(
            &index_config(dir.path()),
            encoder_for(&server),
            search_index_for(&server),
        )
        .await
        .expect("pipeline startup");

        let report = pipeline.run_round().await.expect("round");
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn store_outage_fails_items_and_next_round_retries() {
        let server = MockServer::start().await;
        mount_encoder(&server, 3).await;
        mount_index_creation(&server).await;

        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.jpg"), b"payload a").expect("write");
        std::fs::write(dir.path().join("b.jpg"), b"payload b").expect("write");

        let pipeline = IndexPipeline::new(
            &index_config(dir.path()),
            encoder_for(&server),
            search_index_for(&server),
        )
        .await
        .expect("pipeline startup");

        // The store goes down after startup: every existence check fails.
        Mock::given(method("HEAD"))
            .and(path_regex(r"^/images/_doc/.+$"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        // No expensive work is attempted for unreachable items.
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let report = pipeline.run_round().await.expect("round");
        assert_eq!(report.written, 0);
        assert_eq!(report.failed.len(), 2);
        assert!(
            report
                .failed
                .iter()
                .all(|(_, e)| matches!(e, SnapvaultError::Store(_)))
        );

        // The round completed despite total failure; the next one simply
        // re-attempts the same keys.
        let report = pipeline.run_round().await.expect("second round");
        assert_eq!(report.failed.len(), 2);
    }

    #[tokio::test]
    async fn undecodable_payload_fails_alone() {
        let server = MockServer::start().await;
        mount_encoder(&server, 3).await;
        mount_index_creation(&server).await;

        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("good.jpg"), b"good image").expect("write");
        std::fs::write(dir.path().join("junk.jpg"), b"junk bytes").expect("write");

        Mock::given(method("HEAD"))
            .and(path_regex(r"^/images/_doc/.+$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "input": BASE64.encode(b"junk bytes")
            })))
            .respond_with(ResponseTemplate::new(422).set_body_string("cannot decode image"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "input": BASE64.encode(b"good image")
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "vector": [0.1, 0.2, 0.3]
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path_regex(r"^/images/_create/.+$"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let pipeline = IndexPipeline::new(
            &index_config(dir.path()),
            encoder_for(&server),
            search_index_for(&server),
        )
        .await
        .expect("pipeline startup");

        let report = pipeline.run_round().await.expect("round");
        assert_eq!(report.written, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("junk.jpg"));
        assert!(matches!(report.failed[0].1, SnapvaultError::Payload { .. }));
    }

    #[tokio::test]
    async fn empty_vault_is_a_zero_work_round() {
        let server = MockServer::start().await;
        mount_encoder(&server, 3).await;
        mount_index_creation(&server).await;

        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = IndexPipeline::new(
            &index_config(dir.path()),
            encoder_for(&server),
            search_index_for(&server),
        )
        .await
        .expect("pipeline startup");

        let report = pipeline.run_round().await.expect("round");
        assert_eq!(report.attempted(), 0);
    }
}
