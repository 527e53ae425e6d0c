//! Backends that carry field commands to the solver and reports back.

use std::{
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
};

use kiln_core::{FieldCommand, FieldReport, GridSize};

use crate::field::Field;

/// Transport between the simulation and the substance solver.
pub trait FieldChannel: std::fmt::Debug {
    /// Queues a command. Commands are processed in submission order.
    fn send(&mut self, command: FieldCommand);

    /// Collects every report published since the last drain without blocking.
    ///
    /// Multiple reports are merged: the latest snapshot and turbine speeds win
    /// and condensations are concatenated in publication order.
    fn drain(&mut self) -> Option<FieldReport>;
}

fn merge(latest: Option<FieldReport>, next: FieldReport) -> FieldReport {
    match latest {
        None => next,
        Some(mut merged) => {
            merged.snapshot = next.snapshot;
            merged.condensations.extend(next.condensations);
            merged.turbine_speeds = next.turbine_speeds;
            merged
        }
    }
}

/// Runs the solver on a dedicated worker thread.
#[derive(Debug)]
pub struct ThreadedField {
    commands: Option<Sender<FieldCommand>>,
    reports: Receiver<FieldReport>,
    handle: Option<JoinHandle<()>>,
    disconnected: bool,
}

impl ThreadedField {
    /// Spawns the worker thread owning a field of the given size.
    #[must_use]
    pub fn spawn(size: GridSize) -> Self {
        let (command_tx, command_rx) = mpsc::channel::<FieldCommand>();
        let (report_tx, report_rx) = mpsc::channel::<FieldReport>();
        let handle = thread::Builder::new()
            .name("kiln-substances".to_owned())
            .spawn(move || run_worker(Field::new(size), &command_rx, &report_tx));
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(error) => {
                tracing::warn!(%error, "failed to spawn substance worker");
                None
            }
        };
        Self {
            commands: Some(command_tx),
            reports: report_rx,
            handle,
            disconnected: false,
        }
    }

    fn note_disconnect(&mut self) {
        if !self.disconnected {
            tracing::warn!("substance worker channel closed");
            self.disconnected = true;
        }
    }
}

fn run_worker(mut field: Field, commands: &Receiver<FieldCommand>, reports: &Sender<FieldReport>) {
    tracing::debug!("substance worker started");
    while let Ok(command) = commands.recv() {
        field.apply(command);
        loop {
            match commands.try_recv() {
                Ok(next) => field.apply(next),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }
        if reports.send(field.take_report()).is_err() {
            break;
        }
    }
    tracing::debug!("substance worker stopped");
}

impl FieldChannel for ThreadedField {
    fn send(&mut self, command: FieldCommand) {
        let delivered = self
            .commands
            .as_ref()
            .map(|sender| sender.send(command).is_ok())
            .unwrap_or(false);
        if !delivered {
            self.note_disconnect();
        }
    }

    fn drain(&mut self) -> Option<FieldReport> {
        let mut latest = None;
        loop {
            match self.reports.try_recv() {
                Ok(report) => latest = Some(merge(latest, report)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.note_disconnect();
                    break;
                }
            }
        }
        latest
    }
}

impl Drop for ThreadedField {
    fn drop(&mut self) {
        drop(self.commands.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("substance worker panicked");
            }
        }
    }
}

/// Runs the solver synchronously on the caller's thread.
#[derive(Debug)]
pub struct InlineField {
    field: Field,
    dirty: bool,
}

impl InlineField {
    /// Creates an inline backend owning a field of the given size.
    #[must_use]
    pub fn new(size: GridSize) -> Self {
        Self {
            field: Field::new(size),
            dirty: false,
        }
    }

    /// Read access to the solver state.
    #[must_use]
    pub fn field(&self) -> &Field {
        &self.field
    }
}

impl FieldChannel for InlineField {
    fn send(&mut self, command: FieldCommand) {
        self.field.apply(command);
        self.dirty = true;
    }

    fn drain(&mut self) -> Option<FieldReport> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.field.take_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{CellCoord, SubstanceKind};
    use std::time::{Duration, Instant};

    fn deposit(quantity: f64) -> FieldCommand {
        FieldCommand::Deposit {
            cell: CellCoord::new(0, 0),
            kind: SubstanceKind::Heat,
            quantity,
        }
    }

    #[test]
    fn inline_reports_only_after_commands() {
        let mut channel = InlineField::new(GridSize::new(1, 1));
        assert!(channel.drain().is_none());

        channel.send(deposit(12.0));
        let report = channel.drain().expect("report after command");
        assert_eq!(report.snapshot.get(CellCoord::new(0, 0), SubstanceKind::Heat), 12.0);
        assert!(channel.drain().is_none());
    }

    #[test]
    fn threaded_worker_publishes_in_order() {
        let mut channel = ThreadedField::spawn(GridSize::new(1, 1));
        channel.send(deposit(10.0));
        channel.send(deposit(5.0));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut observed = 0.0;
        while Instant::now() < deadline {
            if let Some(report) = channel.drain() {
                observed = report.snapshot.get(CellCoord::new(0, 0), SubstanceKind::Heat);
                if observed >= 15.0 {
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(observed, 15.0);
    }

    #[test]
    fn merged_reports_keep_every_condensation() {
        let size = GridSize::new(1, 1);
        let first = FieldReport {
            snapshot: kiln_core::SubstanceGrid::new(size),
            condensations: vec![kiln_core::Condensation {
                cell: CellCoord::new(0, 0),
                kind: kiln_core::EntityKind::Ice,
            }],
            turbine_speeds: Vec::new(),
        };
        let second = FieldReport {
            condensations: vec![kiln_core::Condensation {
                cell: CellCoord::new(0, 0),
                kind: kiln_core::EntityKind::Glass,
            }],
            ..first.clone()
        };
        let merged = merge(Some(merge(None, first)), second);
        assert_eq!(merged.condensations.len(), 2);
    }
}
