use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use specsbiz_config::{SpecsBizConfig, StorageBackend};
use specsbiz_core::{BakiAmendment, BakiLineItem, CustomerId, CustomerProfile, RecordId, TenantId};
use specsbiz_ledger::{LedgerEngine, LedgerError, Payment, ReconcileMode, SalesQuery};
use tracing::warn;

use crate::render;
use crate::telemetry::init_tracing;

/// Process exit code when the ledger refuses a command because of its input
/// (unknown customer or record, invalid amount, overpayment).
pub const REJECTED_EXIT_CODE: i32 = 3;

#[derive(Parser)]
#[command(author, version, about = "SpecsBiz credit ledger")]
pub struct Cli {
    /// Explicit configuration file layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Override the configured tenant
    #[arg(long, global = true)]
    tenant: Option<TenantId>,
    /// Override the configured storage backend
    #[arg(long, global = true, value_parser = parse_backend)]
    backend: Option<StorageBackend>,
    /// Override the configured storage path
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage customers
    #[command(subcommand)]
    Customer(CustomerCommand),
    /// Manage credit (baki) records
    #[command(subcommand)]
    Baki(BakiCommand),
    /// Inspect the sales journal
    #[command(subcommand)]
    Sales(SalesCommand),
    /// Compare stored balances with their records
    Reconcile {
        /// Correct drifting balances
        #[arg(long)]
        heal: bool,
    },
    /// Outstanding balances grouped by age
    Aging {
        #[arg(long, value_parser = parse_date)]
        as_of: Option<DateTime<Utc>>,
    },
    /// Total owed across all customers
    Totals,
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
pub enum CustomerCommand {
    Add(ProfileArgs),
    Edit {
        id: CustomerId,
        #[command(flatten)]
        profile: ProfileEditArgs,
    },
    List,
    Show {
        id: CustomerId,
    },
    Delete {
        id: CustomerId,
    },
}

#[derive(Args)]
pub struct ProfileArgs {
    #[arg(long)]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
    #[arg(long, default_value = "")]
    phone: String,
    #[arg(long, default_value = "")]
    address: String,
}

#[derive(Args)]
pub struct ProfileEditArgs {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

#[derive(Subcommand)]
pub enum BakiCommand {
    Add {
        customer: CustomerId,
        #[arg(long)]
        product: String,
        #[arg(long, value_parser = parse_decimal, default_value = "1")]
        quantity: Decimal,
        #[arg(long, value_parser = parse_decimal)]
        amount: Decimal,
        #[arg(long, value_parser = parse_date)]
        promise: Option<DateTime<Utc>>,
        #[arg(long)]
        note: Option<String>,
    },
    Pay {
        customer: CustomerId,
        record: RecordId,
        #[arg(long, value_parser = parse_decimal)]
        amount: Decimal,
        /// Idempotency key; reusing it never applies the payment twice
        #[arg(long)]
        key: Option<String>,
    },
    Amend {
        customer: CustomerId,
        record: RecordId,
        #[arg(long)]
        product: Option<String>,
        #[arg(long, value_parser = parse_decimal)]
        quantity: Option<Decimal>,
        #[arg(long, value_parser = parse_decimal)]
        amount: Option<Decimal>,
        #[arg(long, value_parser = parse_date)]
        promise: Option<DateTime<Utc>>,
        #[arg(long)]
        note: Option<String>,
    },
    Delete {
        customer: CustomerId,
        record: RecordId,
    },
    List {
        customer: CustomerId,
    },
}

#[derive(Subcommand)]
pub enum SalesCommand {
    List {
        #[arg(long)]
        customer: Option<CustomerId>,
        #[arg(long)]
        baki_only: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = SpecsBizConfig::load(cli.config.as_deref())?;
    if let Some(tenant) = cli.tenant.clone() {
        config.tenant = tenant;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    if let Some(path) = cli.store.clone() {
        config.storage.path = path;
    }
    init_tracing(&config.log)?;

    if matches!(cli.command, Commands::Config) {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let engine = Arc::new(
        LedgerEngine::from_config(&config).context("failed to open the ledger store")?,
    );
    let json = cli.json;
    // Ledger operations block on storage I/O; keep them off the async workers.
    let outcome = tokio::task::spawn_blocking(move || execute(&engine, cli.command, json))
        .await
        .context("ledger task panicked")?;
    if let Err(err) = &outcome {
        if let Some(ledger) = err.downcast_ref::<LedgerError>() {
            if ledger.is_rejection() {
                warn!(error = %ledger, "ledger rejected the command");
                eprintln!("rejected: {ledger}");
                std::process::exit(REJECTED_EXIT_CODE);
            }
        }
    }
    outcome
}

fn execute(engine: &LedgerEngine, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Customer(cmd) => customer_command(engine, cmd, json),
        Commands::Baki(cmd) => baki_command(engine, cmd, json),
        Commands::Sales(SalesCommand::List {
            customer,
            baki_only,
            limit,
        }) => {
            let mut query = SalesQuery::default();
            if let Some(customer) = customer {
                query = query.with_customer(customer);
            }
            if baki_only {
                query = query.baki_payments();
            }
            if let Some(limit) = limit {
                query = query.with_limit(limit);
            }
            let sales = engine.sales(query)?;
            emit(json, &sales, || render::sales(&sales))
        }
        Commands::Reconcile { heal } => {
            let mode = if heal {
                ReconcileMode::Heal
            } else {
                ReconcileMode::Report
            };
            let report = engine.reconcile(mode)?;
            emit(json, &report, || render::reconciliation(&report))?;
            let unresolved = match mode {
                ReconcileMode::Report => !report.is_clean(),
                ReconcileMode::Heal => {
                    !report.record_violations.is_empty()
                        || report.healed.len() < report.balance_diff.len()
                }
            };
            if unresolved {
                return Err(anyhow!(
                    "{} balance discrepancies and {} record violations found",
                    report.balance_diff.len(),
                    report.record_violations.len()
                ));
            }
            Ok(())
        }
        Commands::Aging { as_of } => {
            let report = engine.aging_report(as_of.unwrap_or_else(Utc::now))?;
            emit(json, &report, || render::aging(&report))
        }
        Commands::Totals => {
            let total = engine.outstanding_total()?;
            emit(json, &total, || format!("outstanding: {total}"))
        }
        Commands::Config => Ok(()),
    }
}

fn customer_command(engine: &LedgerEngine, cmd: CustomerCommand, json: bool) -> Result<()> {
    match cmd {
        CustomerCommand::Add(args) => {
            let profile = CustomerProfile::new(args.first_name)
                .with_last_name(args.last_name)
                .with_phone(args.phone)
                .with_address(args.address);
            let customer = engine.create_customer(profile)?;
            emit(json, &customer, || render::customer(&customer))
        }
        CustomerCommand::Edit { id, profile } => {
            let current = engine
                .customer(id)?
                .ok_or(LedgerError::CustomerNotFound(id))?;
            let mut merged = current.profile();
            if let Some(first_name) = profile.first_name {
                merged.first_name = first_name;
            }
            if let Some(last_name) = profile.last_name {
                merged.last_name = last_name;
            }
            if let Some(phone) = profile.phone {
                merged.phone = phone;
            }
            if let Some(address) = profile.address {
                merged.address = address;
            }
            let customer = engine.update_customer(id, merged)?;
            emit(json, &customer, || render::customer(&customer))
        }
        CustomerCommand::List => {
            let customers = engine.customers()?;
            emit(json, &customers, || render::customers(&customers))
        }
        CustomerCommand::Show { id } => {
            let customer = engine
                .customer(id)?
                .ok_or(LedgerError::CustomerNotFound(id))?;
            let records = engine.records(id)?;
            if json {
                #[derive(Serialize)]
                struct Detail<'a> {
                    customer: &'a specsbiz_core::Customer,
                    records: &'a [specsbiz_core::BakiRecord],
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&Detail {
                        customer: &customer,
                        records: &records,
                    })?
                );
                return Ok(());
            }
            println!("{}", render::customer(&customer));
            println!("{}", render::records(&records));
            Ok(())
        }
        CustomerCommand::Delete { id } => {
            let removed = engine.delete_customer(id)?;
            emit(json, &removed, || {
                format!("deleted customer {id} and {removed} baki records")
            })
        }
    }
}

fn baki_command(engine: &LedgerEngine, cmd: BakiCommand, json: bool) -> Result<()> {
    match cmd {
        BakiCommand::Add {
            customer,
            product,
            quantity,
            amount,
            promise,
            note,
        } => {
            let mut item = BakiLineItem::new(product, quantity, amount);
            item.promise_date = promise;
            item.note = note;
            let record = engine.add_baki_record(customer, item)?;
            emit(json, &record, || render::records(std::slice::from_ref(&record)))
        }
        BakiCommand::Pay {
            customer,
            record,
            amount,
            key,
        } => {
            let mut payment = Payment::new(amount);
            if let Some(key) = key {
                payment = payment.with_key(key);
            }
            let receipt = engine.pay_baki_record(customer, record, payment)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&receipt.sale)?);
                return Ok(());
            }
            let prefix = if receipt.replayed {
                "already applied"
            } else {
                "collected"
            };
            println!(
                "{prefix} {} on {} (sale #{}), remaining {}, status {}",
                receipt.sale.total,
                receipt.record.product_name,
                receipt.sale.sequence,
                receipt.record.outstanding(),
                receipt.record.status
            );
            Ok(())
        }
        BakiCommand::Amend {
            customer,
            record,
            product,
            quantity,
            amount,
            promise,
            note,
        } => {
            let amendment = BakiAmendment {
                product_name: product,
                quantity,
                amount,
                promise_date: promise.map(Some),
                note: note.map(Some),
            };
            let record = engine.amend_baki_record(customer, record, amendment)?;
            emit(json, &record, || render::records(std::slice::from_ref(&record)))
        }
        BakiCommand::Delete { customer, record } => {
            let removed = engine.delete_baki_record(customer, record)?;
            emit(json, &removed, || {
                format!(
                    "deleted {} (remaining {} written off the balance)",
                    removed.product_name,
                    removed.outstanding()
                )
            })
        }
        BakiCommand::List { customer } => {
            let records = engine.records(customer)?;
            emit(json, &records, || render::records(&records))
        }
    }
}

fn emit<T: Serialize + ?Sized>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn parse_decimal(value: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|err| format!("invalid amount '{value}': {err}"))
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid date '{value}', expected YYYY-MM-DD or RFC 3339"))
}

fn parse_backend(value: &str) -> Result<StorageBackend, String> {
    match value.to_ascii_lowercase().as_str() {
        "sqlite" => Ok(StorageBackend::Sqlite),
        "local" => Ok(StorageBackend::Local),
        other => Err(format!("unknown storage backend '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_plain_and_rfc3339_dates() {
        let date = parse_date("2024-03-01").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(parse_date("2024-03-01T10:00:00+06:00").is_ok());
        assert!(parse_date("next tuesday").is_err());
    }

    #[test]
    fn parses_decimal_amounts() {
        assert_eq!(parse_decimal(" 12.50 ").unwrap(), Decimal::new(1250, 2));
        assert!(parse_decimal("12,5").is_err());
    }
}
