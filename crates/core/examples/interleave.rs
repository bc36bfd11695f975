//! Two clients over one in-memory terminal API, alternating calls.
//!
//! Run with `RUST_LOG=mtplex=debug` to watch the binding move between terminals.

use std::path::{Path, PathBuf};

use anyhow::Result;
use mtplex::fake::{FakeAccount, FakeLauncher, FakeTerminalApi};
use mtplex::{Client, SharedTerminal};
use tracing_subscriber::EnvFilter;

fn private_terminal(root: &Path, name: &str) -> Result<PathBuf> {
	let dir = root.join(name);
	std::fs::create_dir_all(&dir)?;
	let exe = dir.join("terminal64.exe");
	std::fs::write(&exe, b"MZ")?;
	Ok(exe)
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mtplex=info")))
		.init();

	let temp = tempfile::tempdir()?;
	let t1 = private_terminal(temp.path(), "alpha")?;
	let t2 = private_terminal(temp.path(), "beta")?;

	let api = FakeTerminalApi::new()
		.with_terminal(&t1, FakeAccount::new(111, "p1", "Broker-Demo").with_balance(1_000.0))
		.with_terminal(&t2, FakeAccount::new(222, "p2", "Broker-Demo").with_balance(2_500.0));
	let shared = SharedTerminal::with_launcher(api, FakeLauncher::new());

	let alpha = Client::connect(&shared, &t1, 111, "p1", "Broker-Demo").await?;
	let beta = Client::connect(&shared, &t2, 222, "p2", "Broker-Demo").await?;

	for client in [&alpha, &beta, &alpha] {
		let account = client.account_info().await?;
		let tick = client.official.symbol_info_tick("EURUSD").await?;
		println!("{:>6} balance={:>8.2} bid={}", account.login, account.balance, tick["bid"]);
	}

	for client in [alpha, beta] {
		let session = client.session();
		client.shutdown().await?;
		if let Some(session) = session {
			println!("{} made {} calls, {} rebinds", session.identity, session.calls, session.rebinds);
		}
	}
	Ok(())
}
