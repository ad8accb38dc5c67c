pub mod contract_gateway;
pub mod session_manager;
pub mod view_model;
pub mod wallet_provider;

pub use contract_gateway::ContractGateway;
pub use session_manager::SessionManager;
pub use wallet_provider::WalletProvider;
