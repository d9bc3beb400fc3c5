//! The primary binary for the trust-and-content-admission core: loads
//! configuration from the environment, wires C1-C9 together, and serves
//! the public HTTP surface alongside the metrics endpoint and the
//! background expiry worker.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use prov_api::{ApiConfig, AppState};
use prov_crypto::VerifierSigner;
use prov_mint::{ExpiryWorker, LicenseCache, MintService};
use prov_similarity::{
    HttpEmbeddingProvider, HttpLlmAdjudicator, HttpVectorIndexClient, InMemoryVectorIndex,
    MockEmbeddingProvider, SimilarityConfig, SimilarityEngine,
};
use prov_storage::Storage;

/// Configuration for the core binary, loaded from CLI flags or the
/// matching environment variable (spec §6.4).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Opts {
    /// Directory holding the redb database files.
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    data_dir: std::path::PathBuf,

    /// Address the public HTTP surface listens on.
    #[arg(long, env = "HTTP_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    http_listen_addr: String,

    /// Address the Prometheus `/metrics`, `/healthz`, `/readyz` surface listens on.
    #[arg(long, env = "METRICS_LISTEN_ADDR", default_value = "0.0.0.0:9090")]
    metrics_listen_addr: String,

    /// 0x-prefixed or bare hex-encoded backend verifier private key.
    #[arg(long, env = "BACKEND_VERIFIER_PRIVATE_KEY")]
    backend_verifier_private_key: String,

    /// Embedding model HTTP endpoint. When unset the in-process
    /// deterministic mock provider is used (local/dev only).
    #[arg(long, env = "EMBEDDING_API_URL")]
    embedding_api_url: Option<String>,
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "embedding-default")]
    embedding_model: String,
    #[arg(long, env = "EMBEDDING_GATEWAY_BASE", default_value = "https://ipfs.io/ipfs/")]
    embedding_gateway_base: String,
    #[arg(long, env = "EMBEDDING_DIMENSION", default_value_t = 768)]
    embedding_dimension: usize,
    #[arg(long, env = "MAX_VIDEO_FRAMES", default_value_t = 8)]
    max_video_frames: u32,

    /// Vector-index HTTP endpoint. When unset an in-process index is
    /// used (local/dev only; not shared across processes).
    #[arg(long, env = "VECTOR_INDEX_API_URL")]
    vector_index_api_url: Option<String>,
    #[arg(long, env = "VECTOR_INDEX_API_KEY")]
    vector_index_api_key: Option<String>,
    #[arg(long, env = "VECTOR_INDEX_NAME", default_value = "prov-core")]
    vector_index_name: String,

    #[arg(long, env = "LLM_API_URL")]
    llm_api_url: Option<String>,
    #[arg(long, env = "LLM_API_KEY")]
    llm_api_key: Option<String>,
    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,
    #[arg(long, env = "ENABLE_LLM_ANALYSIS", default_value_t = false)]
    enable_llm_analysis: bool,

    #[arg(long, env = "SIMILARITY_T_CLEAN", default_value_t = 40)]
    t_clean: u8,
    #[arg(long, env = "SIMILARITY_T_WARN", default_value_t = 75)]
    t_warn: u8,
    #[arg(long, env = "SIMILARITY_TOP_K", default_value_t = 10)]
    top_k: u32,
    #[arg(long, env = "SIMILARITY_RECENT_BLOCKED_LIMIT", default_value_t = 50)]
    recent_blocked_limit: usize,

    #[arg(long, env = "RATE_LIMIT_RPS", default_value_t = 20)]
    rate_limit_rps: u32,
    #[arg(long, env = "RATE_LIMIT_BURST", default_value_t = 40)]
    rate_limit_burst: u32,
    #[arg(long, env = "RATE_LIMIT_BODY_LIMIT_KB", default_value_t = 256)]
    rate_limit_body_limit_kb: usize,
    /// Comma-separated list of CIDRs trusted to set `X-Forwarded-For`.
    #[arg(long, env = "TRUSTED_PROXIES", default_value = "")]
    trusted_proxies: String,
}

fn parse_trusted_proxies(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    prov_telemetry::init::init_tracing()?;
    let opts = Opts::parse();

    let signer = VerifierSigner::from_private_key_hex(&opts.backend_verifier_private_key)
        .map_err(|e| anyhow!("invalid BACKEND_VERIFIER_PRIVATE_KEY: {e}"))?;
    tracing::info!(verifier_address = %signer.address(), "verifier signer loaded");

    std::fs::create_dir_all(&opts.data_dir).context("creating data directory")?;
    let mint_storage = Storage::open(opts.data_dir.join("mint.redb")).context("opening mint storage")?;
    let similarity_storage =
        Storage::open(opts.data_dir.join("similarity.redb")).context("opening similarity storage")?;

    let embedding_provider: Arc<dyn prov_similarity::EmbeddingProvider> = match &opts.embedding_api_url {
        Some(url) => Arc::new(HttpEmbeddingProvider::new(
            url.clone(),
            opts.embedding_api_key.clone().unwrap_or_default(),
            opts.embedding_model.clone(),
            opts.embedding_gateway_base.clone(),
            opts.max_video_frames,
        )?),
        None => {
            tracing::warn!("EMBEDDING_API_URL not set; using deterministic mock embedding provider");
            Arc::new(MockEmbeddingProvider {
                dimension: opts.embedding_dimension,
            })
        }
    };

    let vector_index: Arc<dyn prov_similarity::VectorIndexClient> = match &opts.vector_index_api_url {
        Some(url) => Arc::new(HttpVectorIndexClient::new(
            url.clone(),
            opts.vector_index_api_key.clone().unwrap_or_default(),
            opts.vector_index_name.clone(),
        )?),
        None => {
            tracing::warn!("VECTOR_INDEX_API_URL not set; using in-process vector index");
            Arc::new(InMemoryVectorIndex::new())
        }
    };

    let llm_adjudicator: Option<Arc<dyn prov_similarity::LlmAdjudicator>> = if opts.enable_llm_analysis {
        opts.llm_api_url
            .as_ref()
            .map(|url| {
                HttpLlmAdjudicator::new(
                    url.clone(),
                    opts.llm_api_key.clone().unwrap_or_default(),
                    opts.llm_model.clone(),
                )
                .map(|adjudicator| Arc::new(adjudicator) as Arc<dyn prov_similarity::LlmAdjudicator>)
            })
            .transpose()?
    } else {
        None
    };

    let similarity_config = SimilarityConfig {
        t_clean: opts.t_clean,
        t_warn: opts.t_warn,
        top_k: opts.top_k,
        enable_llm: opts.enable_llm_analysis && llm_adjudicator.is_some(),
        recent_blocked_limit: opts.recent_blocked_limit,
    };
    let similarity_engine = Arc::new(SimilarityEngine::new(
        similarity_storage,
        embedding_provider,
        vector_index,
        llm_adjudicator,
        similarity_config,
    )?);

    let mint_service = MintService::new(mint_storage.clone(), signer, similarity_engine);
    let license_cache = LicenseCache::new(mint_storage.clone());
    let app_state = Arc::new(AppState {
        mint: mint_service,
        license: license_cache,
    });

    let api_config = ApiConfig {
        listen_addr: opts.http_listen_addr.clone(),
        rps: opts.rate_limit_rps,
        burst: opts.rate_limit_burst,
        body_limit_kb: opts.rate_limit_body_limit_kb,
        trusted_proxies: parse_trusted_proxies(&opts.trusted_proxies),
    };
    let router = prov_api::build_router(app_state, &api_config);

    if let Err(e) = prov_telemetry::prometheus::install() {
        tracing::warn!(error = %e, "prometheus metrics already installed");
    }

    let expiry_handle = ExpiryWorker::new(mint_storage).spawn();

    let metrics_addr: std::net::SocketAddr = opts
        .metrics_listen_addr
        .parse()
        .context("parsing METRICS_LISTEN_ADDR")?;

    let api_result = tokio::select! {
        res = prov_api::run_server(router, &api_config) => res,
        _ = prov_telemetry::http::run_server(metrics_addr) => Ok(()),
    };

    expiry_handle.abort();
    api_result
}
