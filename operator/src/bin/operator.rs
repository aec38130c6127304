use anyhow::Context;
use anyhow::Result;
use cln_bridge::ClnBridge;
use cln_bridge::LnClient;
use operator::cli::Opts;
use operator::gateway::ChainGateway;
use operator::logger;
use operator::monitor::CreditMonitor;
use operator::payment::PaymentOrchestrator;
use operator::routes::router;
use operator::routes::AppState;
use operator::settings::Settings;
use operator::store::Store;
use starknet_bridge::StarknetBridge;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::metadata::LevelFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::read();
    let data_dir = opts.data_dir()?;

    logger::init_tracing(LevelFilter::DEBUG, opts.json)?;

    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .context(format!("Could not create data dir {}", data_dir.display()))?;
    }

    let settings = Settings::new(&data_dir).await;
    settings.validate().context("Invalid settings")?;

    let chain_credential = std::fs::read_to_string(
        settings.resolve(&data_dir, &settings.operator_private_key_path),
    )
    .context("Could not read operator chain credential")?
    .trim()
    .to_string();
    let rune = std::fs::read_to_string(
        settings.resolve(&data_dir, &settings.lightning_auth_token_path),
    )
    .context("Could not read lightning rune")?
    .trim()
    .to_string();

    let store = Arc::new(Store::open(
        settings.resolve(&data_dir, &settings.data_file_path),
    )?);

    let cln: Arc<dyn LnClient> = Arc::new(ClnBridge::new(
        settings.lightning_rest_url.clone(),
        rune,
    ));
    let chain = Arc::new(StarknetBridge::new(
        settings.chain_rpc_url.clone(),
        chain_credential,
    ));
    let gateway = Arc::new(ChainGateway::new(
        chain,
        settings.escrow_address.clone(),
        settings.token_address.clone(),
        settings.token_decimals,
    )?);

    let orchestrator = PaymentOrchestrator::new(
        cln.clone(),
        gateway.clone(),
        store.clone(),
        settings.pay_retry_for_seconds,
        settings.max_fee_percent,
    );

    let monitor = Arc::new(CreditMonitor::new(
        cln.clone(),
        gateway.clone(),
        store.clone(),
        settings.monitor_interval(),
        settings.monitor_retry_delay(),
        settings.monitor_stale_after(),
    ));
    tokio::spawn(monitor.run());

    let app = router(Arc::new(AppState {
        orchestrator,
        gateway,
        store,
        cln,
        tag_secret: settings.tag_secret.clone().into_bytes(),
        invoice_expiry_seconds: settings.invoice_expiry_seconds,
    }));

    let host: IpAddr = opts
        .listen_host
        .parse()
        .context("Invalid listen host")?;
    let addr = SocketAddr::from((host, settings.operator_service_port));
    tracing::info!("Operator service listening on http://{addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
