// Reports module - valuation, cash-flow and return reports

pub mod cashflow;
pub mod performance;
pub mod portfolio;

pub use cashflow::{get_cash_flow, summarize_cash_flows, CashFlowSummary};
pub use performance::{calculate_performance, mwrr, twrr, PerformanceReport, Period};
pub use portfolio::{
    get_account_value, get_asset_quantity, get_value_all, AccountFilter, AccountValue,
    PortfolioValue,
};
