// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch Worker (C7): the per-batch process that owns one sequence's
//! lifecycle end to end — IPC command dispatch, CLI Sequence Worker
//! supervision, MES completion reporting, and the in-memory [`WorkerState`]
//! the manager polls via GET_STATUS.
//!
//! The spec's "spawn a background task that awaits wait()" is expressed
//! here as a third arm of the main `tokio::select!` loop: the CLI Sequence
//! Worker's event channel closing (child stdout/stderr EOF) is the signal
//! to reap it, rather than a detached task racing the command loop.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use station_adapters::driver::Command as DriverCommand;
use station_adapters::{
    spawn_scan_loop, BackendClient, BarcodeScanner, Driver, ProcessCompleteRequest, ProcessStartRequest,
    SessionStatus,
};
use station_core::{
    BatchConfig, BatchId, Clock, CurrentExecution, DriverError, ExecutionId, ExecutionResult, ExecutionStatus,
    LogEntry, LogLevel, MesContext, RunStatus, SequenceMetadata, StepResult, StepResultRow, StepResultStatus,
    SyncAction, SyncEntityType, SyncQueueItem, WorkerError, WorkerPhase, WorkerState,
};
use station_runbook::{install_if_needed, SequenceManifest};
use station_storage::BatchStore;
use station_wire::{
    BarcodeScannedData, Command as WireCommand, CommandType, ErrorData, Event, InputRequestData, LogData,
    Response, SequenceCompleteData, StatusUpdateData, StepCompleteData, StepStartData, WipProcessCompleteData,
};
use tokio::sync::mpsc;

use crate::cli_worker::{ChildEventKind, CliSequenceWorker, SpawnSpec};
use crate::ipc_client::WorkerIpcClient;

/// Incoming START_SEQUENCE params that carry the MES tuple, never folded
/// into sequence parameters.
const MES_PARAM_KEYS: &[&str] =
    &["wip_id", "wip_int_id", "process_id", "operator_id", "equipment_id", "header_id"];

/// Collaborators and static configuration a [`BatchWorker`] needs at
/// startup. Broken out from `BatchWorker` so the startup sequence (manifest
/// load, dependency install, scanner thread) is the only code path that
/// needs to know how these are constructed; tests build a `WorkerDeps`
/// directly against fakes.
pub struct WorkerDeps<C: Clock> {
    pub batch_id: BatchId,
    pub station_id: String,
    pub config: BatchConfig,
    pub store: BatchStore,
    pub backend: BackendClient<C>,
    pub clock: C,
    pub sequences_dir: PathBuf,
    pub drivers: HashMap<String, Arc<dyn Driver>>,
    pub barcode_scanner: Option<Box<dyn BarcodeScanner>>,
    pub auto_sequence_start: bool,
}

/// The Batch Worker process proper. Owns one sequence's lifecycle: command
/// dispatch, CLI Sequence Worker supervision, MES reporting, and the
/// [`WorkerState`] snapshot GET_STATUS returns.
pub struct BatchWorker<C: Clock> {
    deps: WorkerDeps<C>,
    manifest: SequenceManifest,
    ipc: WorkerIpcClient,
    state: WorkerState,
    cli_worker: Option<CliSequenceWorker>,
    events_rx: Option<mpsc::UnboundedReceiver<ChildEventKind>>,
    saw_sequence_complete: bool,
    scan_rx: Option<mpsc::UnboundedReceiver<String>>,
    backend_session_id: Option<i64>,
    should_exit: bool,
}

impl<C: Clock> BatchWorker<C> {
    /// Startup (spec.md §4.7 "At start"): load the manifest, install its
    /// declared dependencies if any, open the MES process session if this
    /// batch names a `process_id`, and start the barcode scanner's read
    /// loop if one is configured. `ipc` is assumed already registered —
    /// connecting crosses a process boundary the constructor itself
    /// shouldn't need to know about.
    pub async fn start(mut deps: WorkerDeps<C>, ipc: WorkerIpcClient) -> Result<Self, WorkerError> {
        let package_dir = deps.sequences_dir.join(&deps.config.sequence_package);
        let manifest =
            SequenceManifest::load(&package_dir).await.map_err(|e| WorkerError::SequenceLoad(e.to_string()))?;

        if let Err(e) = install_if_needed(&package_dir, &manifest).await {
            tracing::warn!(batch_id = %deps.batch_id, error = %e, "sequence dependency install failed");
        }

        let mut state = WorkerState::new();
        state.sequence = Some(SequenceMetadata {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            step_names: manifest.step_names(),
            parameter_defaults: serde_json::to_value(&manifest.parameters).unwrap_or(Value::Null),
            hardware_requirements: manifest.required_hardware().into_iter().map(str::to_string).collect(),
        });
        state.backend.station_id = deps.station_id.clone();
        state.phase = WorkerPhase::Ready;

        let scan_rx = deps.barcode_scanner.take().map(spawn_scan_loop);

        let mut worker = Self {
            deps,
            manifest,
            ipc,
            state,
            cli_worker: None,
            events_rx: None,
            saw_sequence_complete: false,
            scan_rx,
            backend_session_id: None,
            should_exit: false,
        };

        if let Some(process_id) = worker.deps.config.process_id {
            worker.ensure_session(process_id).await;
        }

        Ok(worker)
    }

    /// Main loop: dispatches IPC commands, drains CLI Sequence Worker
    /// events, and relays barcode scans until SHUTDOWN or a transport
    /// failure ends it. Cleanup always runs on the way out, matching the
    /// lifecycle diagram's unconditional STOPPING step.
    pub async fn run(mut self) -> Result<(), WorkerError> {
        let result = self.run_loop().await;
        self.cleanup().await;
        result
    }

    async fn run_loop(&mut self) -> Result<(), WorkerError> {
        while !self.should_exit {
            tokio::select! {
                command = self.ipc.recv_command() => {
                    self.dispatch_command(command?).await?;
                }
                event = next_or_pending(&mut self.events_rx) => {
                    match event {
                        Some(event) => self.handle_child_event(event).await?,
                        None => {
                            if self.cli_worker.is_some() {
                                self.finalize_child_exit().await?;
                            }
                            self.events_rx = None;
                        }
                    }
                }
                scan = next_or_pending(&mut self.scan_rx) => {
                    match scan {
                        Some(value) => self.handle_barcode_scan(value).await?,
                        None => self.scan_rx = None,
                    }
                }
            }
        }
        Ok(())
    }

    async fn dispatch_command(&mut self, command: WireCommand) -> Result<(), WorkerError> {
        let request_id = command.request_id.clone();
        let response = match command.command_type {
            CommandType::StartSequence => match self.start_sequence(command.params).await {
                Ok(data) => Response::ok(request_id, data),
                Err(e) => Response::error(request_id, e.to_string()),
            },
            CommandType::StopSequence => match self.stop_sequence().await {
                Ok(()) => Response::ok(request_id, serde_json::json!({"stopped": true})),
                Err(e) => Response::error(request_id, e.to_string()),
            },
            CommandType::GetStatus => Response::ok(request_id, self.status_snapshot()),
            CommandType::ManualControl => match self.manual_control(command.params).await {
                Ok(data) => Response::ok(request_id, data),
                Err(e) => Response::error(request_id, e.to_string()),
            },
            CommandType::Shutdown => {
                self.should_exit = true;
                Response::ok(request_id, serde_json::json!({"shutting_down": true}))
            }
            CommandType::Ping => {
                self.emit(Event::pong(self.deps.batch_id.clone(), iso_now(&self.deps.clock))).await?;
                Response::ok(request_id, serde_json::json!({"pong": true}))
            }
        };
        self.ipc.send_response(&response).await?;
        Ok(())
    }

    fn status_snapshot(&self) -> Value {
        serde_json::to_value(&self.state).unwrap_or(Value::Null)
    }

    // ---- START_SEQUENCE -----------------------------------------------------

    async fn start_sequence(&mut self, params: Value) -> Result<Value, WorkerError> {
        if self.state.run_status != RunStatus::Idle {
            return Err(WorkerError::SequenceAlreadyRunning);
        }

        let wip_id = params.get("wip_id").and_then(Value::as_str).map(str::to_string);
        let operator_id = params.get("operator_id").and_then(Value::as_str).map(str::to_string);
        let process_id = params.get("process_id").and_then(Value::as_i64).or(self.deps.config.process_id);
        let equipment_id = params.get("equipment_id").and_then(Value::as_str).map(str::to_string);
        let wip_int_id_hint = params.get("wip_int_id").and_then(Value::as_i64);

        let mes = match (&wip_id, process_id, &operator_id) {
            (Some(wip_id), Some(process_id), Some(operator_id))
                if !wip_id.is_empty() && !operator_id.is_empty() =>
            {
                Some(
                    self.resolve_mes_context(
                        wip_id.clone(),
                        wip_int_id_hint,
                        process_id,
                        operator_id.clone(),
                        equipment_id,
                    )
                    .await?,
                )
            }
            _ => None,
        };

        let step_names = self.manifest.step_names();
        let execution_id = ExecutionId::new();
        let started_at = self.deps.clock.epoch_ms();
        let parameters = merge_parameters(&self.manifest, &self.deps.config, &params);

        self.state.run_status = RunStatus::Starting;
        self.state.current_execution = Some(CurrentExecution {
            execution_id: execution_id.clone(),
            started_at,
            current_step: None,
            step_index: 0,
            total_steps: step_names.len() as u32,
            step_results: Vec::new(),
            mes,
            step_names,
        });

        self.deps
            .store
            .create_execution(&ExecutionResult {
                execution_id: execution_id.clone(),
                batch_id: self.deps.batch_id.clone(),
                sequence_name: self.manifest.name.clone(),
                sequence_version: self.manifest.version.clone(),
                status: ExecutionStatus::Running,
                overall_pass: None,
                started_at,
                completed_at: None,
                duration_ms: None,
                parameters: parameters.clone(),
                steps: Vec::new(),
                synced_at: None,
            })
            .await?;

        let spawn_spec = SpawnSpec {
            sequence_package: self.deps.config.sequence_package.clone(),
            sequences_dir: self.deps.sequences_dir.clone(),
            config: serde_json::json!({
                "hardware": self.deps.config.hardware,
                "parameters": parameters,
                "sequence": {"name": self.manifest.name, "version": self.manifest.version},
                "station_id": self.deps.station_id,
            }),
        };
        let mut cli_worker = CliSequenceWorker::spawn(&spawn_spec)?;
        self.events_rx = cli_worker.take_events();
        self.cli_worker = Some(cli_worker);
        self.saw_sequence_complete = false;

        self.state.run_status = RunStatus::Running;
        self.state.phase = WorkerPhase::Running;

        self.emit(Event::status_update(
            self.deps.batch_id.clone(),
            StatusUpdateData {
                status: "running".into(),
                progress: 0.0,
                current_step: None,
                execution_id: Some(execution_id.clone()),
            },
            iso_now(&self.deps.clock),
        ))
        .await?;

        Ok(serde_json::json!({"execution_id": execution_id.to_string()}))
    }

    /// Resolves (and, if needed, opens) the MES process session, looks up
    /// the integer WIP id unless pre-validated, then calls 착공
    /// (`start_process`). 4xx rejects the command; 5xx/connection failure
    /// enqueues a sync-queue item and continues offline (spec.md §4.7 step 1).
    async fn resolve_mes_context(
        &mut self,
        wip_id: String,
        wip_int_id_hint: Option<i64>,
        process_id: i64,
        operator_id: String,
        equipment_id: Option<String>,
    ) -> Result<MesContext, WorkerError> {
        self.ensure_session(process_id).await;

        let wip_int_id = match wip_int_id_hint {
            Some(id) => Some(id),
            None => match self.deps.backend.lookup_wip(&wip_id, Some(process_id)).await {
                Ok(result) => Some(result.wip_int_id),
                Err(e) if e.is_retryable() => {
                    self.mark_offline();
                    None
                }
                Err(e) => return Err(WorkerError::Backend(e)),
            },
        };

        let process_start_time = self.deps.clock.epoch_ms();

        match wip_int_id {
            Some(wip_int_id) => {
                let request = ProcessStartRequest {
                    process_id,
                    operator_id: operator_id.parse::<i64>().ok(),
                    equipment_id: equipment_id.clone(),
                    started_at: Some(iso_now(&self.deps.clock)),
                };
                match self.deps.backend.start_process(wip_int_id, &request).await {
                    Ok(_) => self.mark_online(),
                    Err(e) if e.is_retryable() => {
                        self.mark_offline();
                        self.enqueue_sync(
                            SyncEntityType::WipProcess,
                            wip_id.clone(),
                            SyncAction::StartProcess,
                            serde_json::json!({
                                "wip_id": wip_id, "wip_int_id": wip_int_id, "process_id": process_id,
                                "operator_id": operator_id, "equipment_id": equipment_id,
                            }),
                        )
                        .await?;
                    }
                    Err(e) => return Err(WorkerError::Backend(e)),
                }
            }
            None => {
                self.enqueue_sync(
                    SyncEntityType::WipProcess,
                    wip_id.clone(),
                    SyncAction::StartProcess,
                    serde_json::json!({
                        "wip_id": wip_id, "process_id": process_id,
                        "operator_id": operator_id, "equipment_id": equipment_id,
                    }),
                )
                .await?;
            }
        }

        Ok(MesContext { wip_id, wip_int_id, process_id, operator_id, process_start_time })
    }

    async fn ensure_session(&mut self, process_id: i64) {
        if self.backend_session_id.is_some() {
            return;
        }
        match self
            .deps
            .backend
            .open_session(
                &self.deps.station_id,
                self.deps.batch_id.as_str(),
                process_id,
                self.deps.config.slot_id.get(),
                &self.manifest.name,
                &self.manifest.version,
            )
            .await
        {
            Ok(id) => self.backend_session_id = Some(id),
            Err(e) => {
                tracing::warn!(batch_id = %self.deps.batch_id, error = %e, "failed to open MES process session")
            }
        }
    }

    fn mark_offline(&mut self) {
        if self.state.backend.online {
            tracing::warn!(batch_id = %self.deps.batch_id, "backend unreachable, switching to offline mode");
        }
        self.state.backend.online = false;
    }

    fn mark_online(&mut self) {
        self.state.backend.online = true;
    }

    async fn enqueue_sync(
        &self,
        entity_type: SyncEntityType,
        entity_id: String,
        action: SyncAction,
        payload: Value,
    ) -> Result<(), WorkerError> {
        let item = SyncQueueItem {
            id: 0,
            batch_id: self.deps.batch_id.clone(),
            entity_type,
            entity_id,
            action,
            payload,
            retry_count: 0,
            last_error: None,
            created_at: self.deps.clock.epoch_ms(),
        };
        self.deps.store.enqueue(&item).await?;
        Ok(())
    }

    // ---- STOP_SEQUENCE -----------------------------------------------------

    async fn stop_sequence(&mut self) -> Result<(), WorkerError> {
        let Some(mut cli_worker) = self.cli_worker.take() else {
            return Err(WorkerError::NotRunning);
        };
        self.events_rx = None;
        self.state.run_status = RunStatus::Stopping;

        tokio::task::spawn_blocking(move || cli_worker.stop_blocking())
            .await
            .map_err(|e| WorkerError::Other(format!("stop task panicked: {e}")))??;

        if let Some(session_id) = self.backend_session_id.take() {
            if let Err(e) = self.deps.backend.close_session(session_id, SessionStatus::Cancelled).await {
                tracing::warn!(batch_id = %self.deps.batch_id, error = %e, "failed to close MES session on stop");
            }
        }

        self.state.cancel_execution();
        self.state.phase = WorkerPhase::Ready;

        self.emit(Event::status_update(
            self.deps.batch_id.clone(),
            StatusUpdateData { status: "idle".into(), progress: 0.0, current_step: None, execution_id: None },
            iso_now(&self.deps.clock),
        ))
        .await
    }

    // ---- MANUAL_CONTROL -----------------------------------------------------

    async fn manual_control(&mut self, params: Value) -> Result<Value, WorkerError> {
        if self.state.run_status == RunStatus::Running {
            return Err(WorkerError::Other("cannot manually control hardware while a sequence is running".into()));
        }

        let device_id = params
            .get("device_id")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkerError::Other("manual_control requires device_id".into()))?;
        let command_name = params.get("command").and_then(Value::as_str).unwrap_or_default();
        let command_params = params.get("params").cloned().unwrap_or(Value::Null);

        let driver = self
            .deps
            .drivers
            .get(device_id)
            .ok_or_else(|| WorkerError::Hardware(DriverError::DriverNotFound(device_id.to_string())))?;

        Ok(driver.dispatch(DriverCommand::new(command_name, command_params)).await?)
    }

    // ---- barcode scanning ---------------------------------------------------

    async fn handle_barcode_scan(&mut self, value: String) -> Result<(), WorkerError> {
        self.emit(Event::barcode_scanned(
            self.deps.batch_id.clone(),
            BarcodeScannedData { value: value.clone() },
            iso_now(&self.deps.clock),
        ))
        .await?;

        if self.deps.auto_sequence_start && self.state.run_status == RunStatus::Idle {
            if let Err(e) = self.start_sequence(serde_json::json!({"wip_id": value})).await {
                tracing::warn!(batch_id = %self.deps.batch_id, error = %e, "auto sequence start from scan failed");
            }
        }
        Ok(())
    }

    // ---- CLI Sequence Worker event stream -----------------------------------

    async fn handle_child_event(&mut self, event: ChildEventKind) -> Result<(), WorkerError> {
        let Some(execution_id) = self.state.current_execution.as_ref().map(|e| e.execution_id.clone()) else {
            return Ok(());
        };
        let batch_id = self.deps.batch_id.clone();
        let timestamp = iso_now(&self.deps.clock);

        match event {
            ChildEventKind::StepStart { step, index, total, step_names } => {
                if let Some(exec) = self.state.current_execution.as_mut() {
                    exec.current_step = Some(step.clone());
                    exec.step_index = index;
                    exec.total_steps = total;
                    exec.step_results.push(StepResult::pending(step.clone()));
                }
                self.emit(Event::step_start(
                    batch_id,
                    StepStartData { step, index, total, execution_id, step_names },
                    timestamp,
                ))
                .await
            }
            ChildEventKind::StepComplete { step, index, pass, duration_ms, payload } => {
                if let Some(exec) = self.state.current_execution.as_mut() {
                    if let Some(result) = exec.step_results.iter_mut().rev().find(|r| r.name == step) {
                        result.status = if pass { StepResultStatus::Completed } else { StepResultStatus::Failed };
                        result.duration_ms = Some(duration_ms);
                        result.payload = Some(payload.clone());
                    }
                }
                self.emit(Event::step_complete(
                    batch_id,
                    StepCompleteData { step, index, duration_ms, pass, result: payload, execution_id },
                    timestamp,
                ))
                .await
            }
            ChildEventKind::Measurement { .. } => {
                // Folded into its owning step's payload by the child itself;
                // there is no separate wire event for a raw measurement.
                Ok(())
            }
            ChildEventKind::Log { level, message } => {
                let log_level = parse_log_level(&level);
                if let Err(e) = self
                    .deps
                    .store
                    .append_log(&LogEntry {
                        id: 0,
                        batch_id: batch_id.clone(),
                        execution_id: Some(execution_id),
                        level: log_level,
                        message: message.clone(),
                        timestamp: self.deps.clock.epoch_ms(),
                    })
                    .await
                {
                    tracing::warn!(batch_id = %batch_id, error = %e, "failed to persist log entry");
                }
                self.emit(Event::log(batch_id, LogData { level, message }, timestamp)).await
            }
            ChildEventKind::Error { code, message, step } => {
                self.emit(Event::error(batch_id, ErrorData { code, message, step }, timestamp)).await
            }
            ChildEventKind::Status { status, progress, current_step } => {
                self.emit(
                    Event::status_update(
                        batch_id,
                        StatusUpdateData { status, progress, current_step, execution_id: Some(execution_id) },
                        timestamp,
                    ),
                )
                .await
            }
            ChildEventKind::InputRequest { id, prompt, input_type, options, default, timeout_secs } => {
                self.emit(Event::input_request(
                    batch_id,
                    InputRequestData { id, prompt, input_type, options, default, timeout_secs, execution_id },
                    timestamp,
                ))
                .await
            }
            ChildEventKind::SequenceComplete { overall_pass, duration_ms, result, steps } => {
                self.saw_sequence_complete = true;
                self.on_sequence_complete(overall_pass, duration_ms, result, steps, timestamp).await
            }
        }
    }

    /// Reaps the child once its event channel closes (stdout/stderr EOF),
    /// synthesizing a `SequenceComplete` if it exited abnormally without
    /// ever emitting one (I8).
    async fn finalize_child_exit(&mut self) -> Result<(), WorkerError> {
        let Some(cli_worker) = self.cli_worker.take() else { return Ok(()) };
        let saw = self.saw_sequence_complete;
        let synthesized = tokio::task::spawn_blocking(move || cli_worker.wait_blocking(saw))
            .await
            .map_err(|e| WorkerError::Other(format!("wait task panicked: {e}")))??;

        if let Some(event) = synthesized {
            self.handle_child_event(event).await?;
        }
        Ok(())
    }

    // ---- Completion (spec.md §4.7 "Completion") ------------------------------

    async fn on_sequence_complete(
        &mut self,
        overall_pass: bool,
        duration_ms: u64,
        result: Value,
        steps: Vec<Value>,
        timestamp: String,
    ) -> Result<(), WorkerError> {
        let Some(exec) = self.state.current_execution.clone() else { return Ok(()) };
        let completed_at = self.deps.clock.epoch_ms();

        if let Some(mes) = exec.mes.clone() {
            let measurements = result.get("measurements").cloned().unwrap_or_else(|| serde_json::json!({}));
            let defect_codes = extract_defect_codes(&exec.step_results);
            self.complete_mes_process(&mes, overall_pass, duration_ms, measurements, defect_codes).await?;
        }

        let step_rows = build_step_rows(&exec.step_results);
        let status = if overall_pass { ExecutionStatus::Completed } else { ExecutionStatus::Failed };
        self.deps
            .store
            .complete_execution(&exec.execution_id, status, Some(overall_pass), completed_at, duration_ms, &step_rows)
            .await?;

        self.emit(Event::sequence_complete(
            self.deps.batch_id.clone(),
            SequenceCompleteData { execution_id: exec.execution_id.clone(), overall_pass, duration_ms, result, steps },
            timestamp.clone(),
        ))
        .await?;

        self.state.complete_execution(overall_pass, completed_at);
        self.state.phase = WorkerPhase::Ready;

        self.emit(Event::status_update(
            self.deps.batch_id.clone(),
            StatusUpdateData { status: "idle".into(), progress: 1.0, current_step: None, execution_id: None },
            timestamp,
        ))
        .await
    }

    /// 완공. Retryable backend failure enqueues `complete_process` for
    /// offline sync; a non-retryable one emits an ERROR event and the
    /// execution still completes locally (spec.md §4.7 "Completion" step 1).
    async fn complete_mes_process(
        &mut self,
        mes: &MesContext,
        overall_pass: bool,
        duration_ms: u64,
        measurements: Value,
        defect_codes: Vec<String>,
    ) -> Result<(), WorkerError> {
        let result_str = if overall_pass { "PASS".to_string() } else { "FAIL".to_string() };

        let Some(wip_int_id) = mes.wip_int_id else {
            return self
                .enqueue_sync(
                    SyncEntityType::WipProcess,
                    mes.wip_id.clone(),
                    SyncAction::CompleteProcess,
                    serde_json::json!({
                        "wip_id": mes.wip_id, "process_id": mes.process_id, "operator_id": mes.operator_id,
                        "result": result_str, "duration_ms": duration_ms,
                        "measurements": measurements, "defects": defect_codes,
                    }),
                )
                .await;
        };

        let operator_id = mes.operator_id.parse::<i64>().unwrap_or(0);
        let request = ProcessCompleteRequest {
            result: result_str.clone(),
            measurements: measurements.clone(),
            defect_codes: defect_codes.clone(),
            duration_ms: Some(duration_ms),
            started_at: None,
            completed_at: Some(iso_now(&self.deps.clock)),
        };

        match self.deps.backend.complete_process(wip_int_id, mes.process_id, operator_id, &request).await {
            Ok(_) => {
                self.mark_online();
                self.emit(Event::wip_process_complete(
                    self.deps.batch_id.clone(),
                    WipProcessCompleteData { wip_id: mes.wip_id.clone(), can_convert: overall_pass },
                    iso_now(&self.deps.clock),
                ))
                .await
            }
            Err(e) if e.is_retryable() => {
                self.mark_offline();
                self.enqueue_sync(
                    SyncEntityType::WipProcess,
                    mes.wip_id.clone(),
                    SyncAction::CompleteProcess,
                    serde_json::json!({
                        "wip_int_id": wip_int_id, "process_id": mes.process_id, "operator_id": operator_id,
                        "result": result_str, "duration_ms": duration_ms,
                        "measurements": measurements, "defects": defect_codes,
                    }),
                )
                .await
            }
            Err(e) => {
                self.emit(Event::error(
                    self.deps.batch_id.clone(),
                    ErrorData { code: "mes_complete_failed".into(), message: e.to_string(), step: None },
                    iso_now(&self.deps.clock),
                ))
                .await
            }
        }
    }

    // ---- cleanup --------------------------------------------------------------

    /// Close-on-cleanup (spec.md §4.7): unconditional session close,
    /// CLI worker teardown, IPC/store/driver disconnect happen as the
    /// collaborators are dropped at the end of `run`.
    async fn cleanup(&mut self) {
        self.state.phase = WorkerPhase::Stopping;

        if let Some(cli_worker) = self.cli_worker.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || cli_worker.stop_blocking()).await {
                tracing::warn!(batch_id = %self.deps.batch_id, error = %e, "cli worker teardown task panicked");
            }
        }

        if let Some(session_id) = self.backend_session_id.take() {
            if let Err(e) = self.deps.backend.close_session(session_id, SessionStatus::Cancelled).await {
                tracing::warn!(batch_id = %self.deps.batch_id, error = %e, "failed to close MES session on cleanup");
            }
        }

        self.state.phase = WorkerPhase::Stopped;
    }

    async fn emit(&mut self, event: Event) -> Result<(), WorkerError> {
        self.ipc.send_event(&event).await?;
        Ok(())
    }
}

/// `rx.recv()` when present, else a future that never resolves — lets a
/// `tokio::select!` arm go dormant once a channel is spent instead of
/// busy-polling a closed one.
async fn next_or_pending<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(r) => r.recv().await,
        None => std::future::pending().await,
    }
}

fn iso_now(clock: &impl Clock) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(clock.epoch_ms() as i64)
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn parse_log_level(level: &str) -> LogLevel {
    match level {
        "debug" => LogLevel::Debug,
        "warning" | "warn" => LogLevel::Warning,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

/// Merges manifest parameter defaults, then the batch's configured
/// parameters, then the incoming command's own parameters (excluding the
/// MES tuple keys, which are handled separately).
fn merge_parameters(manifest: &SequenceManifest, config: &BatchConfig, incoming: &Value) -> Value {
    let mut merged = serde_json::Map::new();
    for (key, def) in &manifest.parameters {
        if let Some(default) = &def.default {
            merged.insert(key.clone(), default.clone());
        }
    }
    for (key, value) in &config.parameters {
        merged.insert(key.clone(), value.clone());
    }
    if let Some(obj) = incoming.as_object() {
        for (key, value) in obj {
            if MES_PARAM_KEYS.contains(&key.as_str()) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Flattens `step.defects` and any `step.error` for non-passing steps into
/// a deduplicated defect code list for 완공 (spec.md §4.7 Completion step 1).
fn extract_defect_codes(steps: &[StepResult]) -> Vec<String> {
    let mut defects = Vec::new();
    for step in steps {
        if step.pass() == Some(false) {
            if let Some(payload) = &step.payload {
                if let Some(step_defects) = payload.get("defects").and_then(Value::as_array) {
                    for defect in step_defects.iter().filter_map(Value::as_str) {
                        if !defects.iter().any(|d: &String| d == defect) {
                            defects.push(defect.to_string());
                        }
                    }
                }
                if let Some(error) = payload.get("error").and_then(Value::as_str) {
                    if !defects.iter().any(|d: &String| d == error) {
                        defects.push(error.to_string());
                    }
                }
            }
        }
    }
    defects
}

fn build_step_rows(steps: &[StepResult]) -> Vec<StepResultRow> {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| StepResultRow {
            step_order: i as u32 + 1,
            name: step.name.clone(),
            status: step.status,
            pass: step.pass(),
            duration_ms: step.duration_ms,
            payload: step.payload.clone(),
            error: if step.status == StepResultStatus::Failed {
                step.payload.as_ref().and_then(|p| p.get("error")).and_then(Value::as_str).map(str::to_string)
            } else {
                None
            },
        })
        .collect()
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
