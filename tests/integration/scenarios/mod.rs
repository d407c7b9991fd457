pub mod iperf3_tests;
pub mod lifecycle_tests;
pub mod raw_tcp_tests;
pub mod resolver_tests;
