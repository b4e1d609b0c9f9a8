//! Output formatting module for CLI display
//!
//! This module handles all terminal output formatting, separating
//! the concerns of data calculation from presentation.

use chrono::NaiveDate;
use colored::Colorize;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

use ledgerline::corporate_actions::QuantityAdjustment;
use ledgerline::db::{Account, Asset, TransactionCategory};
use ledgerline::pricing::prune::PrunePlan;
use ledgerline::reports::{AccountValue, PerformanceReport, PortfolioValue};
use ledgerline::utils::{format_amount, format_pct};

/// Green for gains, red for losses
fn signed(value: Decimal, text: String) -> String {
    if value >= Decimal::ZERO {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

fn render<T: Tabled>(rows: &[T], numeric_from: usize) -> String {
    Table::new(rows)
        .with(Style::modern())
        .with(Modify::new(Columns::new(numeric_from..)).with(Alignment::right()))
        .to_string()
}

#[derive(Tabled)]
struct ValueRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Cash")]
    cash: String,
    #[tabled(rename = "Flows")]
    flows: String,
    #[tabled(rename = "Profit")]
    profit: String,
}

fn value_rows(
    dates: &[NaiveDate],
    values: &[Decimal],
    cash: &[Decimal],
    flows: &[Decimal],
    profits: &[Decimal],
) -> Vec<ValueRow> {
    (0..dates.len())
        .map(|i| ValueRow {
            date: dates[i].to_string(),
            value: format_amount(values[i]),
            cash: format_amount(cash[i]),
            flows: if flows[i].is_zero() {
                String::new()
            } else {
                format_amount(flows[i])
            },
            profit: signed(profits[i], format_amount(profits[i])),
        })
        .collect()
}

/// Daily totals plus the closing value of each account
pub fn format_portfolio_table(value: &PortfolioValue, accounts: &[Account]) -> String {
    let mut output = format!("\n{} Portfolio Value\n\n", "📊".cyan().bold());

    let rows = value_rows(
        &value.dates,
        &value.values,
        &value.cash,
        &value.external_flows,
        &value.profits,
    );
    output.push_str(&render(&rows, 1));

    #[derive(Tabled)]
    struct AccountRow {
        #[tabled(rename = "Account")]
        name: String,
        #[tabled(rename = "Currency")]
        currency: String,
        #[tabled(rename = "Closing Value")]
        value: String,
        #[tabled(rename = "Profit")]
        profit: String,
    }

    let names: HashMap<i64, &Account> = accounts.iter().map(|a| (a.id, a)).collect();
    let account_rows: Vec<AccountRow> = value
        .by_account
        .values()
        .map(|acc| {
            let closing = acc.values.last().copied().unwrap_or_default();
            let profit = acc.profits.last().copied().unwrap_or_default();
            let (name, currency) = match names.get(&acc.account_id) {
                Some(a) if a.closed => (format!("{} (closed)", a.name), a.currency.clone()),
                Some(a) => (a.name.clone(), a.currency.clone()),
                None => (format!("#{}", acc.account_id), String::new()),
            };
            AccountRow {
                name,
                currency,
                value: format_amount(closing),
                profit: signed(profit, format_amount(profit)),
            }
        })
        .collect();

    if !account_rows.is_empty() {
        output.push_str(&format!("\n\n{} By Account\n\n", "━".repeat(40).bright_black()));
        output.push_str(&render(&account_rows, 2));
    }
    output.push('\n');
    output
}

/// Daily value of one account with the closing per-asset breakdown
pub fn format_account_table(value: &AccountValue, account: &Account, assets: &[Asset]) -> String {
    let mut output = format!(
        "\n{} {} ({})\n\n",
        "📊".cyan().bold(),
        account.name.bold(),
        account.currency
    );

    let rows = value_rows(
        &value.dates,
        &value.values,
        &value.cash,
        &value.external_flows,
        &value.profits,
    );
    output.push_str(&render(&rows, 1));

    #[derive(Tabled)]
    struct AssetRow {
        #[tabled(rename = "Asset")]
        asset: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Closing Value")]
        value: String,
    }

    let by_id: HashMap<i64, &Asset> = assets.iter().map(|a| (a.id, a)).collect();
    let asset_rows: Vec<AssetRow> = value
        .by_asset
        .iter()
        .map(|held| {
            let closing = held.values.last().copied().unwrap_or_default();
            let (asset, category) = match by_id.get(&held.asset_id) {
                Some(a) => (a.label().to_string(), a.category.as_str().to_string()),
                None => (format!("#{}", held.asset_id), String::new()),
            };
            AssetRow {
                asset,
                category,
                value: format_amount(closing),
            }
        })
        .collect();

    if !asset_rows.is_empty() {
        output.push_str(&format!("\n\n{} Holdings\n\n", "━".repeat(40).bright_black()));
        output.push_str(&render(&asset_rows, 2));
    }
    output.push('\n');
    output
}

/// Non-zero daily cash flows, one row per day and category
pub fn format_cash_flow_table(
    dates: &[NaiveDate],
    flows: &BTreeMap<i64, Vec<Decimal>>,
    categories: &[TransactionCategory],
) -> String {
    #[derive(Tabled)]
    struct FlowRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Amount")]
        amount: String,
    }

    let names: HashMap<i64, &str> = categories.iter().map(|c| (c.id, c.name.as_str())).collect();
    let mut rows = Vec::new();
    for (i, date) in dates.iter().enumerate() {
        for (category_id, series) in flows {
            let amount = series[i];
            if amount.is_zero() {
                continue;
            }
            rows.push(FlowRow {
                date: date.to_string(),
                category: names
                    .get(category_id)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("#{}", category_id)),
                amount: signed(amount, format_amount(amount)),
            });
        }
    }

    if rows.is_empty() {
        return format!("{} No cash flow in this range\n", "ℹ".blue().bold());
    }

    let mut output = format!("\n{} Cash Flow\n\n", "💰".cyan().bold());
    output.push_str(&render(&rows, 2));

    #[derive(Tabled)]
    struct TotalRow {
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Total")]
        total: String,
    }
    let totals: Vec<TotalRow> = flows
        .iter()
        .map(|(category_id, series)| {
            let total: Decimal = series.iter().sum();
            TotalRow {
                category: names
                    .get(category_id)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("#{}", category_id)),
                total: signed(total, format_amount(total)),
            }
        })
        .collect();
    output.push_str(&format!("\n\n{} Totals\n\n", "━".repeat(40).bright_black()));
    output.push_str(&render(&totals, 1));
    output.push('\n');
    output
}

/// Quantities on the first day and on every day they change
pub fn format_quantities_table(
    dates: &[NaiveDate],
    quantities: &BTreeMap<i64, Vec<Decimal>>,
    assets: &[Asset],
) -> String {
    #[derive(Tabled)]
    struct QuantityRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Asset")]
        asset: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
    }

    if quantities.is_empty() {
        return format!("{} No holdings in this range\n", "ℹ".blue().bold());
    }

    let labels: HashMap<i64, &str> = assets.iter().map(|a| (a.id, a.label())).collect();
    let mut rows = Vec::new();
    for (i, date) in dates.iter().enumerate() {
        for (asset_id, series) in quantities {
            if i > 0 && series[i] == series[i - 1] {
                continue;
            }
            rows.push(QuantityRow {
                date: date.to_string(),
                asset: labels
                    .get(asset_id)
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| format!("#{}", asset_id)),
                quantity: series[i].normalize().to_string(),
            });
        }
    }

    let mut output = format!("\n{} Holdings\n\n", "📦".cyan().bold());
    output.push_str(&render(&rows, 2));
    output.push('\n');
    output
}

pub fn format_performance(report: &PerformanceReport) -> String {
    let mut output = format!("\n{} Performance Report\n", "📈".cyan().bold());
    output.push_str(&format!(
        "  Period: {} → {}\n\n",
        report.start_date, report.end_date
    ));
    output.push_str(&format!(
        "  Start Value:       {}\n",
        format_amount(report.start_value).cyan()
    ));
    output.push_str(&format!(
        "  End Value:         {}\n",
        format_amount(report.end_value).cyan()
    ));
    output.push_str(&format!(
        "  Profit:            {}\n\n",
        signed(report.profit, format_amount(report.profit))
    ));
    output.push_str(&format!(
        "  Time-weighted:     {}\n",
        signed(
            report.time_weighted_return,
            format_pct(report.time_weighted_return)
        )
    ));
    let mwr = match report.money_weighted_return {
        Some(rate) => signed(rate, format!("{} p.a.", format_pct(rate))),
        None => "n/a".bright_black().to_string(),
    };
    output.push_str(&format!("  Money-weighted:    {}\n", mwr));

    let flows = &report.cash_flows;
    if flows.flow_count > 0 {
        output.push_str(&format!(
            "\n  Contributions:     {}\n",
            format_amount(flows.total_contributions).green()
        ));
        output.push_str(&format!(
            "  Withdrawals:       {}\n",
            format_amount(flows.total_withdrawals).red()
        ));
        output.push_str(&format!(
            "  Net Flow:          {} ({} days with flows)\n",
            format_amount(flows.net_flow),
            flows.flow_count
        ));
    }
    output
}

/// Pending or applied quantity changes for one asset
pub fn format_adjustments(asset: &Asset, changes: &[QuantityAdjustment], dry_run: bool) -> String {
    if changes.is_empty() {
        return format!(
            "{} {}: quantities already up to date\n",
            "✓".green().bold(),
            asset.label()
        );
    }

    #[derive(Tabled)]
    struct AdjustmentRow {
        #[tabled(rename = "Split")]
        split_id: i64,
        #[tabled(rename = "Old Quantity")]
        old: String,
        #[tabled(rename = "New Quantity")]
        new: String,
    }

    let rows: Vec<AdjustmentRow> = changes
        .iter()
        .map(|c| AdjustmentRow {
            split_id: c.split_id,
            old: c
                .old_quantity
                .map(|q| q.normalize().to_string())
                .unwrap_or_else(|| "-".to_string()),
            new: c.new_quantity.normalize().to_string(),
        })
        .collect();

    let verb = if dry_run { "would change" } else { "changed" };
    let mut output = format!(
        "\n{} {}: {} {} quantities\n\n",
        "🔀".cyan().bold(),
        asset.label().bold(),
        rows.len(),
        verb
    );
    output.push_str(&render(&rows, 0));
    output.push('\n');
    output
}

/// Prune outcome for one asset
pub fn format_prune(asset: &Asset, plan: &PrunePlan, dry_run: bool) -> String {
    if plan.is_empty() {
        return format!(
            "{} {}: no redundant valuations\n",
            "✓".green().bold(),
            asset.label()
        );
    }
    let verb = if dry_run { "would delete" } else { "deleted" };
    format!(
        "{} {}: {} {} valuations\n",
        "🧹".cyan().bold(),
        asset.label().bold(),
        verb,
        plan.valuation_ids.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline::db::AssetCategory;
    use rust_decimal_macros::dec;

    fn asset() -> Asset {
        Asset {
            id: 4,
            name: "Example Corp".into(),
            category: AssetCategory::Security,
            interpolate: false,
            ticker: Some("EXC".into()),
        }
    }

    #[test]
    fn test_quantities_table_lists_changes_only() {
        colored::control::set_override(false);
        let dates: Vec<NaiveDate> = (1..=3)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let mut quantities = BTreeMap::new();
        quantities.insert(4, vec![dec!(10), dec!(10), dec!(5)]);

        let table = format_quantities_table(&dates, &quantities, &[asset()]);
        assert!(table.contains("2024-01-01"));
        assert!(!table.contains("2024-01-02"));
        assert!(table.contains("2024-01-03"));
        assert!(table.contains("EXC"));
    }

    #[test]
    fn test_prune_message() {
        colored::control::set_override(false);
        let plan = PrunePlan {
            asset_id: 4,
            valuation_ids: vec![1, 2],
        };
        assert!(format_prune(&asset(), &plan, true).contains("would delete 2 valuations"));
        let empty = PrunePlan {
            asset_id: 4,
            valuation_ids: Vec::new(),
        };
        assert!(format_prune(&asset(), &empty, false).contains("no redundant valuations"));
    }
}
