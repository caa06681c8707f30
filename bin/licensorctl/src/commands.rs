//! ---
//! lic_section: "06-binaries"
//! lic_subsection: "binary"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "licensorctl subcommands."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use licensor_engine::{CreateLicense, EntitlementEngine};
use licensor_store::{
    from_epoch_seconds, load_snapshot, now, save_snapshot, LicenseRecord, LicenseStore,
};
use tracing::info;

/// Product id used by the seeded sample licenses.
pub const SAMPLE_PRODUCT: &str = "3e200daa-6bf8-470b-bd6a-4f55996052c3";
const SAMPLE_ENTITY: &str = "595959595959595-|-User";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Populate an empty store with sample licenses.
    Seed,
    /// List all licenses.
    List,
    /// Show detailed info for a license by key.
    Show {
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// Provision a license.
    Create(CreateArgs),
    /// Delete an unbound license by key.
    Erase {
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// Write every license to a snapshot file.
    Export {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Load licenses from a snapshot file, replacing records with the same serial.
    Import {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long)]
    serial: String,
    #[arg(long)]
    key: String,
    #[arg(long, default_value = SAMPLE_PRODUCT)]
    product: String,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=10))]
    seats: u32,
    /// Expiration in epoch seconds; perpetual when omitted.
    #[arg(long, value_name = "EPOCH_SECONDS")]
    expires: Option<i64>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    comment: Option<String>,
    /// Key of the license this one upgrades; marks the license as an upgrade.
    #[arg(long, value_name = "KEY")]
    upgrade_from: Option<String>,
    /// Mark as an upgrade without pinning the previous key.
    #[arg(long)]
    upgrade: bool,
}

impl CreateArgs {
    fn into_request(self) -> Result<CreateLicense> {
        let expiration = self
            .expires
            .map(|seconds| {
                from_epoch_seconds(seconds)
                    .ok_or_else(|| anyhow!("--expires {seconds} is out of range"))
            })
            .transpose()?;
        Ok(CreateLicense {
            number_of_seats: self.seats,
            expiration,
            email: self.email,
            comment: self.comment,
            is_upgrade: self.upgrade || self.upgrade_from.is_some(),
            upgrade_from_key: self.upgrade_from,
            ..CreateLicense::new(self.serial, self.key, self.product)
        })
    }
}

/// Execute `command`, returning the text to print.
pub fn run(command: Command, engine: &EntitlementEngine, store: &dyn LicenseStore) -> Result<String> {
    match command {
        Command::Seed => seed(engine, store),
        Command::List => Ok(render_list(&engine.dump()?)),
        Command::Show { key } => {
            let tx = store.begin()?;
            Ok(match tx.find_by_key(&key)? {
                Some(record) => render_details(&record, now()),
                None => format!("No license found with key: {key}"),
            })
        }
        Command::Create(args) => {
            let record = engine.create(args.into_request()?)?;
            Ok(format!("Created license {} ({})", record.serial, record.key))
        }
        Command::Erase { key } => {
            let record = engine.erase(&key)?;
            Ok(format!("Erased license {} ({})", record.serial, record.key))
        }
        Command::Export { path } => {
            let records = engine.dump()?;
            save_snapshot(&records, &path)
                .with_context(|| format!("unable to write snapshot {}", path.display()))?;
            info!(path = %path.display(), count = records.len(), "snapshot exported");
            Ok(format!("Exported {} licenses to {}", records.len(), path.display()))
        }
        Command::Import { path } => {
            let records = load_snapshot(&path)
                .with_context(|| format!("unable to read snapshot {}", path.display()))?;
            let mut tx = store.begin()?;
            tx.save_all(&records)?;
            tx.commit()?;
            info!(path = %path.display(), count = records.len(), "snapshot imported");
            Ok(format!("Imported {} licenses from {}", records.len(), path.display()))
        }
    }
}

fn seed(engine: &EntitlementEngine, store: &dyn LicenseStore) -> Result<String> {
    if engine.count()? > 0 {
        return Ok("License table already populated.".to_owned());
    }
    let mut disabled = LicenseRecord::new("SERIAL_NO_2", "LICENSE_KEY_2", SAMPLE_PRODUCT);
    disabled.enabled = false;
    let mut bound = LicenseRecord::new("SERIAL_NO_3", "LICENSE_KEY_3", SAMPLE_PRODUCT);
    bound.bound_entity_id = Some(SAMPLE_ENTITY.to_owned());
    let records = [
        LicenseRecord::new("SERIAL_NO_1", "LICENSE_KEY_1", SAMPLE_PRODUCT),
        disabled,
        bound,
    ];

    let mut tx = store.begin()?;
    tx.save_all(&records)?;
    tx.commit()?;
    Ok("Default licenses created.".to_owned())
}

fn render_list(records: &[LicenseRecord]) -> String {
    if records.is_empty() {
        return "No licenses found.".to_owned();
    }
    let lines: Vec<String> = records
        .iter()
        .map(|record| {
            format!(
                "- {} | key: {} | product: {} | enabled: {}",
                record.serial, record.key, record.product_id, record.enabled
            )
        })
        .collect();
    format!("Found licenses:\n{}", lines.join("\n"))
}

fn render_details(record: &LicenseRecord, at: DateTime<Utc>) -> String {
    fn or_na(value: Option<&str>) -> &str {
        value.unwrap_or("N/A")
    }
    fn instant(value: Option<&DateTime<Utc>>) -> String {
        value.map_or_else(|| "N/A".to_owned(), |at| at.to_rfc3339())
    }

    format!(
        "Serial: {}\nKey: {}\nProduct ID: {}\nEnabled: {}\nSeats: {}\nExpiration: {}\nExpired: {}\nEntity ID: {}\nUpgrade: {}\nUpgraded from: {}\nEmail: {}\nComment: {}\nLast modified: {}",
        record.serial,
        record.key,
        record.product_id,
        record.enabled,
        record.number_of_seats,
        instant(record.expiration.as_ref()),
        if record.is_expired(at) { "yes" } else { "no" },
        or_na(record.bound_entity_id.as_deref()),
        record.is_upgrade,
        or_na(record.upgrade_from_key.as_deref()),
        or_na(record.email.as_deref()),
        or_na(record.comment.as_deref()),
        record.last_modified.to_rfc3339(),
    )
}
