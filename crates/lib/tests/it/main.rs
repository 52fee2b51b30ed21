/*! Integration tests for Normcache.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - store: Identity, merging and deletion through the public cache API
 * - policy: Read policies, computed fields and reactive variables inside policies
 * - reactive: Variables owned by a cache and their interaction with watches
 * - query: Result-tree writes and reads, arguments and incomplete reads
 * - cache: Eviction, garbage collection, watches and batching
 * - scenario: The countries selection flow end to end
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("normcache=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod helpers;
mod policy;
mod query;
mod store;
