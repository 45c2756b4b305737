/*! Integration tests for vusermgr.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * - engine: save/list/delete behaviour and the user lifecycle
 * - sync: credential file regeneration, crash recovery and temp file contention
 * - tree: per-user directory trees and root containment
 * - guard: process exclusivity on the credential file
 * - reconcile: bringing the user root back in line with the store
 * - store: the record store matrix selected by TEST_BACKEND
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("vusermgr=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod engine;
mod guard;
mod helpers;
mod store;
mod sync;
mod tree;
