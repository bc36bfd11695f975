mod common;

use common::{Harness, SERVER, fast_options};
use mtplex::{Client, Credentials, ErrorKind, LastError, TerminalApi, TerminalPhase, ops};

#[tokio::test]
async fn crashed_terminal_fails_calls_until_reconstructed() {
	let h = Harness::new();
	let a = Client::connect(&h.shared, &h.t1, 111, "p1", SERVER).await.expect("client A");
	let b = Client::connect(&h.shared, &h.t2, 222, "p2", SERVER).await.expect("client B");

	h.launcher.crash(&h.t1);
	let err = a.account_info().await.expect_err("terminal is gone");
	assert_eq!(err.kind(), ErrorKind::Initialization);
	assert_eq!(a.session().expect("session").phase, TerminalPhase::Exited);

	let again = a.official.call(ops::VERSION).await.expect_err("still gone");
	assert_eq!(again.kind(), ErrorKind::Initialization);
	assert_eq!(b.account_info().await.expect("B is unaffected").login, 222);

	drop(a);
	let a = Client::connect(&h.shared, &h.t1, 111, "p1", SERVER).await.expect("reconstructed client");
	assert_eq!(a.account_info().await.expect("account").login, 111);
}

#[tokio::test]
async fn forwarding_error_leaves_client_usable() {
	let h = Harness::new();
	let a = Client::connect(&h.shared, &h.t1, 111, "p1", SERVER).await.expect("client A");

	h.api.fail_operation(&h.t1, ops::ACCOUNT_INFO, LastError::new(-1, "Terminal: Call failed"));
	let err = a.account_info().await.expect_err("injected failure");
	assert_eq!(err.kind(), ErrorKind::Forwarding);
	assert_eq!(err.last_error(), Some(&LastError::new(-1, "Terminal: Call failed")));

	h.api.clear_failure(&h.t1, ops::ACCOUNT_INFO);
	assert_eq!(a.account_info().await.expect("recovered").login, 111);
}

#[tokio::test]
async fn last_error_is_per_client() {
	let h = Harness::new();
	let mut api = h.api.clone();
	let a = Client::connect(&h.shared, &h.t1, 111, "p1", SERVER).await.expect("client A");
	let b = Client::connect(&h.shared, &h.t2, 222, "p2", SERVER).await.expect("client B");

	a.official.call("no_such_operation").await.expect_err("A fails");
	b.version().await.expect("B succeeds afterwards");

	assert!(api.last_error().is_ok(), "the wrapped API only remembers the latest call");
	assert_eq!(a.last_error().code, -7);
	assert!(b.last_error().is_ok());
	assert!(api.invoke(ops::VERSION, &Default::default()).is_ok());
}

#[tokio::test]
async fn relogin_rebinds_and_logs_in() {
	let h = Harness::new();
	let a = Client::connect(&h.shared, &h.t1, 111, "p1", SERVER).await.expect("client A");
	let _b = Client::connect(&h.shared, &h.t2, 222, "p2", SERVER).await.expect("client B");

	a.relogin().await.expect("relogin");
	assert_eq!(h.shared.bound_identity().as_ref(), Some(a.identity()));
	assert!(a.last_error().is_ok());
}

#[tokio::test]
async fn version_decodes_terminal_tuple() {
	let h = Harness::new();
	let a = Client::connect(&h.shared, &h.t1, 111, "p1", SERVER).await.expect("client A");

	let version = a.version().await.expect("version");
	assert_eq!(version.version, "500");
	assert_eq!(version.build, 4410);
}

#[tokio::test]
async fn kept_terminal_is_attached_by_next_client() {
	let h = Harness::new();
	let options = fast_options().with_keep_terminal_running(true);
	let a = Client::connect_with_options(&h.shared, &h.t1, Credentials::new(111, "p1", SERVER), options.clone())
		.await
		.expect("client A");
	assert!(a.session().expect("session").owns_process);
	a.shutdown().await.expect("shutdown");
	assert_eq!(h.launcher.running_count(), 1, "terminal outlives the client");

	let a = Client::connect_with_options(&h.shared, &h.t1, Credentials::new(111, "p1", SERVER), options)
		.await
		.expect("second client attaches");
	let session = a.session().expect("session");
	assert!(!session.owns_process);
	assert!(session.pid.is_some());
	assert_eq!(h.launcher.running(), vec![Harness::canonical(&h.t1)]);
}

#[tokio::test]
async fn drop_releases_terminal_and_path() {
	let h = Harness::new();
	{
		let a = Client::connect(&h.shared, &h.t1, 111, "p1", SERVER).await.expect("client A");
		assert_eq!(h.shared.live_identities(), vec![a.identity().clone()]);
	}

	assert!(h.shared.live_identities().is_empty());
	assert_eq!(h.launcher.running_count(), 0);
	assert_eq!(h.shared.bound_identity(), None);
	assert_eq!(h.api.current(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drop_on_worker_thread_releases_synchronously() {
	let h = Harness::new();
	let a = Client::connect(&h.shared, &h.t1, 111, "p1", SERVER).await.expect("client A");
	let b = Client::connect(&h.shared, &h.t2, 222, "p2", SERVER).await.expect("client B");

	drop(a);
	assert_eq!(h.launcher.running(), vec![Harness::canonical(&h.t2)]);
	assert_eq!(h.shared.live_identities(), vec![b.identity().clone()]);
	assert_eq!(b.account_info().await.expect("B keeps working").login, 222);
}
