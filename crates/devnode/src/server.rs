use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use safenote_sdk::encryption::wire::{
    InputProofRequest, InputProofResponse, KeysResponse, PublicDecryptRequest,
    PublicDecryptResponse,
};
use safenote_sdk::ledger::wire::{
    AvailabilityResponse, ContractResponse, HandleResponse, NoteIdsResponse, TxResponse,
    TxStatusResponse, VerifyRequest,
};
use safenote_sdk::ledger::{CreateNoteRequest, TxHandle};
use safenote_sdk::NoteRecord;

use crate::config::DevnodeConfig;
use crate::error::Result;
use crate::ledger::NoteLedger;
use crate::relayer::EncryptionRelayer;
use crate::sealing::Sealer;

pub struct DevnodeState {
    pub config: DevnodeConfig,
    pub ledger: Arc<NoteLedger>,
    pub relayer: EncryptionRelayer,
}

impl DevnodeState {
    pub fn new(config: DevnodeConfig) -> Self {
        let sealer = Arc::new(Sealer::new(&config.proof_secret));
        let ledger = Arc::new(NoteLedger::new(
            &config.contract_address,
            sealer.clone(),
            config.confirmation_delay,
        ));
        let relayer = EncryptionRelayer::new(sealer, ledger.clone());
        info!(
            "Devnode state ready (contract {}, key {})",
            config.contract_address,
            relayer.keys().key_id
        );

        Self {
            config,
            ledger,
            relayer,
        }
    }
}

/// Ledger facade and encryption relayer share one router, so a single
/// address serves as both base URLs.
pub fn router(state: Arc<DevnodeState>) -> Router {
    Router::new()
        .route("/health", get(health))
        // Ledger contract facade
        .route("/contract", get(get_contract))
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/:id", get(get_note))
        .route("/notes/:id/handle", get(get_handle))
        .route("/notes/:id/verify", post(verify_note))
        .route("/tx/:tx", get(get_tx))
        .route("/available", get(get_available))
        // Encryption relayer
        .route("/keys", get(get_keys))
        .route("/input-proof", post(input_proof))
        .route("/public-decrypt", post(public_decrypt))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(listener: tokio::net::TcpListener, state: Arc<DevnodeState>) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub async fn run(state: Arc<DevnodeState>) -> anyhow::Result<()> {
    let addr = state.config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Devnode listening on {}", addr);
    serve(listener, state).await
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_contract(State(state): State<Arc<DevnodeState>>) -> Json<ContractResponse> {
    Json(ContractResponse {
        address: state.ledger.contract_address().to_string(),
    })
}

async fn list_notes(State(state): State<Arc<DevnodeState>>) -> Json<NoteIdsResponse> {
    Json(NoteIdsResponse {
        ids: state.ledger.note_ids().await,
    })
}

async fn get_note(
    State(state): State<Arc<DevnodeState>>,
    Path(id): Path<String>,
) -> Result<Json<NoteRecord>> {
    Ok(Json(state.ledger.note(&id).await?))
}

async fn get_handle(
    State(state): State<Arc<DevnodeState>>,
    Path(id): Path<String>,
) -> Result<Json<HandleResponse>> {
    let handle = state.ledger.handle(&id).await?;
    Ok(Json(HandleResponse { handle }))
}

async fn create_note(
    State(state): State<Arc<DevnodeState>>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<Json<TxResponse>> {
    let tx = state.ledger.create(req).await?;
    Ok(Json(TxResponse { tx: TxHandle(tx) }))
}

async fn verify_note(
    State(state): State<Arc<DevnodeState>>,
    Path(id): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<TxResponse>> {
    let tx = state
        .ledger
        .verify(&id, req.clear_values.as_slice(), req.proof.as_slice())
        .await?;
    Ok(Json(TxResponse { tx: TxHandle(tx) }))
}

async fn get_tx(
    State(state): State<Arc<DevnodeState>>,
    Path(tx): Path<String>,
) -> Result<Json<TxStatusResponse>> {
    Ok(Json(state.ledger.tx_status(&tx).await?))
}

async fn get_available(State(state): State<Arc<DevnodeState>>) -> Json<AvailabilityResponse> {
    Json(AvailabilityResponse {
        available: state.ledger.is_available(),
    })
}

async fn get_keys(State(state): State<Arc<DevnodeState>>) -> Json<KeysResponse> {
    Json(state.relayer.keys())
}

async fn input_proof(
    State(state): State<Arc<DevnodeState>>,
    Json(req): Json<InputProofRequest>,
) -> Result<Json<InputProofResponse>> {
    Ok(Json(state.relayer.input_proof(&req)?))
}

async fn public_decrypt(
    State(state): State<Arc<DevnodeState>>,
    Json(req): Json<PublicDecryptRequest>,
) -> Result<Json<PublicDecryptResponse>> {
    Ok(Json(state.relayer.public_decrypt(&req).await?))
}
