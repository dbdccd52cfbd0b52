pub mod contracts;
pub mod ledger;
pub mod oracle;
pub mod rpc;
