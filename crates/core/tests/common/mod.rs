#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mtplex::fake::{FakeAccount, FakeLauncher, FakeTerminalApi};
use mtplex::{ClientOptions, SharedTerminal};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const SERVER: &str = "Broker-Demo";

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mtplex=debug")))
		.with_test_writer()
		.try_init();
}

/// Writes a stand-in terminal executable into `root/name/`.
pub fn private_terminal(root: &Path, name: &str) -> PathBuf {
	let dir = root.join(name);
	std::fs::create_dir_all(&dir).expect("terminal dir should be created");
	let exe = dir.join("terminal64.exe");
	std::fs::write(&exe, b"MZ").expect("terminal stub should be written");
	exe
}

/// Short deadlines so failure paths finish quickly.
pub fn fast_options() -> ClientOptions {
	ClientOptions::default()
		.with_timeout(Duration::from_millis(400))
		.with_poll_interval(Duration::from_millis(5))
}

/// Two private terminals, 111 on `t1` and 222 on `t2`, behind one shared API.
pub struct Harness {
	pub temp: TempDir,
	pub api: FakeTerminalApi,
	pub launcher: FakeLauncher,
	pub shared: Arc<SharedTerminal>,
	pub t1: PathBuf,
	pub t2: PathBuf,
}

impl Harness {
	pub fn new() -> Self {
		init_tracing();
		let temp = TempDir::new().expect("temp dir");
		let t1 = private_terminal(temp.path(), "t1");
		let t2 = private_terminal(temp.path(), "t2");
		let api = FakeTerminalApi::new()
			.with_terminal(&t1, FakeAccount::new(111, "p1", SERVER).with_balance(1_000.0))
			.with_terminal(&t2, FakeAccount::new(222, "p2", SERVER).with_balance(2_000.0));
		let launcher = FakeLauncher::new();
		let shared = SharedTerminal::with_launcher(api.clone(), launcher.clone());
		Self {
			temp,
			api,
			launcher,
			shared,
			t1,
			t2,
		}
	}

	pub fn canonical(path: &Path) -> PathBuf {
		std::fs::canonicalize(path).expect("terminal path should resolve")
	}
}
