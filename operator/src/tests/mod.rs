mod credit_flow;
mod issuance_flow;
