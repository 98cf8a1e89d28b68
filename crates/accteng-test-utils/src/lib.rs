pub mod assertions;
pub mod server;
pub mod stores;

pub use assertions::{assert_xrpc_error, assert_xrpc_ok};
pub use server::{
    TEST_DID, TEST_HANDLE, TEST_JWT_SECRET, TEST_PASSWORD, create_test_config,
    create_test_engine_state, create_test_router, create_test_router_and_stores, login,
    send_request,
};
pub use stores::{TestStores, create_test_stores};
