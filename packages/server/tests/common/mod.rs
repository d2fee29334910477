pub mod harness;
pub mod stub;

pub use harness::TestHarness;
#[allow(unused_imports)]
pub use stub::StubBackend;
