/*!
# Heapster DevKit - test tooling for the heapster publisher

- mock exposure server (no port bound)
- measurement and batch builders with docker namespaces
- template fixtures
- `TestHarness` driving a publisher end to end
*/

pub mod batch_helpers;
pub mod exposure_stub;
pub mod test_utils;

pub use batch_helpers::{BatchBuilder, ALIAS_TEMPLATE};
pub use exposure_stub::MockExposure;
pub use test_utils::TestHarness;
