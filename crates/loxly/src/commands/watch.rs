//! `loxly watch`: stream state changes until stopped.

use std::collections::HashSet;
use std::sync::Arc;

use loxly_config::Config;
use loxly_core::{Client, EventHandlers, ListenExit, StateEvent, StateId, StructureCatalog};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, EventPrinter};

pub async fn handle(args: WatchArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let printer = EventPrinter::new(config::output_format(global, cfg), color);

    let (catalog, resolved) = super::load_catalog(global, cfg).await?;
    check_selection(&catalog, &args)?;
    let narrow = narrowing(&catalog, &args).map(Arc::new);

    let resolved = match resolved {
        Some(resolved) => resolved,
        None => config::resolve(global, cfg)?,
    };
    let profile_name = resolved.profile_name;
    let host = resolved.client.host.clone();

    let mut client = Client::new(resolved.client, catalog);
    for room in &args.room {
        client.watch_room(room);
    }
    for control in &args.control {
        client.watch_control(control);
    }
    client.watch_ids(args.uuid.iter().copied());
    if narrow.is_none() {
        for key in &args.state_key {
            client.watch_state_key(key);
        }
    }

    output::banner(&format!("Connecting to {host}..."), color);
    client
        .connect()
        .await
        .map_err(|e| CliError::from(e).for_profile(&profile_name))?;

    let watching = if client.filter().is_unfiltered() {
        "all states".to_owned()
    } else {
        format!("{} states", client.filter().len())
    };
    output::banner(&format!("Watching {watching} (Ctrl-C to stop)"), color);

    let cancel = client.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let handlers = event_handlers(printer, narrow, args.changes_only);
    let printing = client.spawn_handlers(handlers);

    let outcome = client.listen(args.duration.map(Into::into)).await;
    client.disconnect().await;
    // Dropping the client closes the event channel; the printer drains what is left.
    drop(client);
    if let Err(e) = printing.await {
        tracing::warn!(error = %e, "event printer task failed");
    }

    match outcome? {
        ListenExit::DurationElapsed => {
            output::banner("Duration elapsed", color);
            Ok(())
        }
        ListenExit::Cancelled => {
            output::banner("Stopped", color);
            Ok(())
        }
        ListenExit::ConnectionClosed => Err(CliError::StreamEnded),
    }
}

/// Reject room and control selections that match nothing, and a
/// state-key-only selection that matches nothing.
fn check_selection(catalog: &StructureCatalog, args: &WatchArgs) -> Result<(), CliError> {
    let not_found = |resource_type: &str, identifier: &str| CliError::NotFound {
        resource_type: resource_type.into(),
        identifier: identifier.into(),
        list_command: "rooms".into(),
    };

    if let Some(room) = args.room.iter().find(|r| catalog.query_by_room(r).is_empty()) {
        return Err(not_found("Room", room));
    }
    if let Some(control) = args
        .control
        .iter()
        .find(|c| catalog.query_by_control(c).is_empty())
    {
        return Err(not_found("Control", control));
    }
    if !has_primary_selection(args)
        && !args.state_key.is_empty()
        && args
            .state_key
            .iter()
            .all(|k| catalog.query_by_state_key(k).is_empty())
    {
        return Err(not_found("State key", &args.state_key.join(", ")));
    }
    Ok(())
}

fn has_primary_selection(args: &WatchArgs) -> bool {
    !(args.room.is_empty() && args.control.is_empty() && args.uuid.is_empty())
}

/// With a room, control or id selection, `--state-key` narrows what is
/// printed instead of widening the subscription.
fn narrowing(catalog: &StructureCatalog, args: &WatchArgs) -> Option<HashSet<StateId>> {
    if args.state_key.is_empty() || !has_primary_selection(args) {
        return None;
    }
    Some(
        args.state_key
            .iter()
            .flat_map(|k| catalog.query_by_state_key(k))
            .collect(),
    )
}

fn event_handlers(
    printer: EventPrinter,
    narrow: Option<Arc<HashSet<StateId>>>,
    changes_only: bool,
) -> EventHandlers {
    let shown = move |event: &StateEvent| narrow.as_ref().is_none_or(|ids| ids.contains(event.id()));
    let shown_initial = shown.clone();

    let mut handlers = EventHandlers::new().on_change(move |event| {
        if shown(event) {
            printer.print(event);
        }
    });
    if !changes_only {
        handlers = handlers.on_initial(move |event| {
            if shown_initial(event) {
                printer.print(event);
            }
        });
    }
    handlers
}
