//! `loxly status`: one snapshot of a room's current values.
//!
//! The Miniserver sends the value of every state right after binary
//! updates are enabled, so listening for a short window is enough to see
//! the whole room. Nothing is sent back to the Miniserver.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::StreamExt;
use loxly_config::Config;
use loxly_core::{Client, ListenExit, StateId, StateValue, StructureCatalog};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, StatusRow};

pub async fn handle(args: StatusArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let format = config::output_format(global, cfg);

    let (catalog, resolved) = super::load_catalog(global, cfg).await?;
    if catalog.query_by_room(&args.room).is_empty() {
        return Err(CliError::NotFound {
            resource_type: "Room".into(),
            identifier: args.room,
            list_command: "rooms".into(),
        });
    }

    let resolved = match resolved {
        Some(resolved) => resolved,
        None => config::resolve(global, cfg)?,
    };
    let profile_name = resolved.profile_name;
    let host = resolved.client.host.clone();

    let catalog = Arc::new(catalog);
    let mut client = Client::new(resolved.client, Arc::clone(&catalog));
    client.watch_room(&args.room);

    let collecting = tokio::spawn(client.events().fold(
        BTreeMap::<StateId, StateValue>::new(),
        |mut latest, event| async move {
            latest.insert(*event.id(), event.value().clone());
            latest
        },
    ));

    output::banner(&format!("Connecting to {host}..."), color);
    client
        .connect()
        .await
        .map_err(|e| CliError::from(e).for_profile(&profile_name))?;

    let cancel = client.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = client.listen(Some(args.wait.into())).await;
    client.disconnect().await;
    drop(client);
    let latest = collecting.await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "status collector task failed");
        BTreeMap::new()
    });

    let rows = status_rows(&catalog, latest);
    output::print_output(&output::render_status(format, &rows)?);

    match outcome? {
        ListenExit::DurationElapsed | ListenExit::Cancelled => Ok(()),
        ListenExit::ConnectionClosed => Err(CliError::StreamEnded),
    }
}

/// One row per state, sorted by display name.
fn status_rows(catalog: &StructureCatalog, latest: BTreeMap<StateId, StateValue>) -> Vec<StatusRow> {
    let mut rows: Vec<StatusRow> = latest
        .into_iter()
        .map(|(id, value)| {
            let meta = catalog.resolve(&id);
            StatusRow {
                uuid: id.to_string(),
                name: catalog.display_name(&id),
                control_type: meta.map(|m| m.control_type.clone()).unwrap_or_default(),
                value,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uuid.cmp(&b.uuid)));
    rows
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "rooms": {"0a1b2c3d-0000-0000-0000-000000000001": {"name": "Office"}},
        "controls": {
            "0a1b2c3d-0000-0000-0000-0000000000c1": {
                "name": "Thermostat",
                "type": "IRoomControllerV2",
                "room": "0a1b2c3d-0000-0000-0000-000000000001",
                "states": {
                    "tempActual": "0f2b3c4d-1a2b-03c4-ffff-0403f1e8a5b2",
                    "tempTarget": "0f2b3c4d-1a2b-03c4-ffff-0403f1e8a5b3"
                }
            }
        }
    }"#;

    #[test]
    fn rows_are_named_and_sorted() {
        let catalog = StructureCatalog::load(DOC).unwrap();
        let target: StateId = "0f2b3c4d-1a2b-03c4-ffff-0403f1e8a5b3".parse().unwrap();
        let actual: StateId = "0f2b3c4d-1a2b-03c4-ffff-0403f1e8a5b2".parse().unwrap();
        let unknown: StateId = "ffffffff-0000-0000-0000-000000000000".parse().unwrap();
        let latest = BTreeMap::from([
            (target, StateValue::Number(22.0)),
            (actual, StateValue::Number(21.5)),
            (unknown, StateValue::Number(0.0)),
        ]);

        let rows = status_rows(&catalog, latest);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Office/Thermostat/tempActual",
                "Office/Thermostat/tempTarget",
                "ffffffff-0000-0000-0000-000000000000",
            ]
        );
        assert_eq!(rows[0].control_type, "IRoomControllerV2");
        assert_eq!(rows[0].value, StateValue::Number(21.5));
        assert_eq!(rows[2].control_type, "");
    }
}
