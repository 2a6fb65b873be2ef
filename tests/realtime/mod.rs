mod auth_tests;
mod call_tests;
mod messaging_tests;
mod presence_tests;
mod router_tests;
