use l2_account_sync::utils::format_token_amount;
use l2_account_sync::{AccountClient, ClientConfig, Session};

use std::env;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn session_from_env() -> Result<Session, String> {
	let var = |name: &str| env::var(name).map_err(|_| format!("{} is not set", name));
	Ok(Session {
		address: var("L2_SYNC_ADDRESS")?,
		view_key: var("L2_SYNC_VIEW_KEY")?,
		spend_pub: var("L2_SYNC_SPEND_PUB")?,
	})
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("info,l2_account_sync=debug")),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting account sync client");

	let config = match env::var("L2_SYNC_CONFIG") {
		Ok(path) => match ClientConfig::from_file(&path).await {
			Ok(config) => config,
			Err(e) => {
				error!("Failed to load config from {}: {}", path, e);
				return;
			}
		},
		Err(_) => ClientConfig::default(),
	};

	let session = match session_from_env() {
		Ok(session) => session,
		Err(e) => {
			error!("Missing account credentials: {}", e);
			return;
		}
	};

	let client = match AccountClient::connect(config).await {
		Ok(client) => client,
		Err(e) => {
			error!("Failed to create account client: {}", e);
			return;
		}
	};

	client.login(session);

	if let Err(e) = client.sync().await {
		error!("Initial sync failed: {}", e);
	}

	match client.fetch_token_balances().await {
		Ok(balances) => {
			for balance in balances {
				let (symbol, decimals) = balance
					.token
					.as_ref()
					.map(|t| (t.symbol.clone(), t.decimals))
					.unwrap_or_else(|| (format!("token #{}", balance.token_index), 0));
				info!(
					"Balance: {} {}",
					format_token_amount(balance.amount, decimals),
					symbol
				);
			}
		}
		Err(e) => error!("Failed to fetch balances: {}", e),
	}

	let limit = client.config().history_limit;
	match client.fetch_transactions(0, limit).await {
		Ok(page) => {
			for tx in page.transactions.iter().take(10) {
				info!(
					"{:?} {:?} {} -> {} ({})",
					tx.tx_type, tx.status, tx.from, tx.to, tx.amount
				);
			}
		}
		Err(e) => error!("Failed to fetch history: {}", e),
	}

	let ticks: u32 = env::var("L2_SYNC_TICKS")
		.ok()
		.and_then(|v| v.parse().ok())
		.unwrap_or(1);
	client.start_periodic_sync();
	tokio::time::sleep(client.config().sync_interval() * ticks).await;

	match client.cached_user_data() {
		Ok(data) => info!("Last committed tx watermark: {}", data.tx_lpt),
		Err(e) => error!("{}", e),
	}

	client.logout().await;
	info!("Account sync client stopped");
}
