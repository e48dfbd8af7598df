//! The dosing orchestrator.
//!
//! One `perform_cycle` call is one evaluation pass: read the reservoir,
//! decide whether exactly one pump should fire, and record the result.
//! Safety checks run in a fixed order before any physical work — attempt
//! limiter, startup delay, kill switch, config flag, circuit breaker,
//! single-flight lock — and the lock is released on every exit path.

use crate::breaker::CircuitBreaker;
use crate::config::{DosingConfig, EngineCfg, PidGains, PumpSettings};
use crate::control::MonitoringControl;
use crate::effectiveness::EffectivenessTracker;
use crate::error::{BuildError, CycleError, Result as CoreResult};
use crate::gate;
use crate::guard::CycleGuard;
use crate::history::{DAILY_WINDOW_MS, DoseHistory, DoseRecord};
use crate::mapping;
use crate::outcome::{CycleOutcome, Parameter, RateHold};
use crate::pid::{self, PidState};
use crate::store::{ConfigPatch, ConfigStore};
use hydro_traits::clock::{Clock, MonotonicClock};
use hydro_traits::{PumpActuator, PumpRole, SensorReading, SensorSource};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Substituted when a pH reading is missing or implausible.
pub const PH_FALLBACK: f64 = 6.0;
/// Substituted when an EC reading is missing or implausible.
pub const EC_FALLBACK: f64 = 1.4;

/// Returns the usable value and whether a fallback was substituted.
fn sanitize_ph(raw: f64) -> (f64, bool) {
    if raw.is_finite() && raw > 0.0 && raw < 14.0 {
        (raw, false)
    } else {
        (PH_FALLBACK, true)
    }
}

fn sanitize_ec(raw: f64) -> (f64, bool) {
    if raw.is_finite() && (0.0..=5.0).contains(&raw) {
        (raw, false)
    } else {
        (EC_FALLBACK, true)
    }
}

/// Controller state plus the gains that produced it; a gain change in
/// configuration resets the state.
#[derive(Debug, Clone, Copy)]
struct PidTrack {
    state: PidState,
    gains: PidGains,
}

impl Default for PidTrack {
    fn default() -> Self {
        Self {
            state: PidState::default(),
            gains: PidGains::default(),
        }
    }
}

/// Point-in-time view of the engine for the management surface.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub config_enabled: bool,
    pub monitoring_enabled: bool,
    pub circuit_open: bool,
    pub fail_count: u32,
    pub circuit_resets_at_ms: Option<u64>,
    pub cycle_in_flight: bool,
    pub uptime_ms: u64,
    pub last_dose: Option<DoseRecord>,
    pub doses_last_24h: usize,
    pub pending_effect_checks: usize,
}

/// Unified engine for both generic (static dispatch) and boxed variants.
pub struct AutoDoserCore<S, P, C>
where
    S: SensorSource + Send + 'static,
    P: PumpActuator,
    C: ConfigStore,
{
    // Shared with deferred effectiveness checks.
    sensor: Arc<Mutex<S>>,
    pumps: P,
    store: C,
    control: MonitoringControl,
    clock: Arc<dyn Clock + Send + Sync>,
    // Epoch Instant; all engine timestamps are ms since this point.
    epoch: Instant,
    engine: EngineCfg,
    guard: CycleGuard,
    breaker: CircuitBreaker,
    history: DoseHistory,
    ph_pid: PidTrack,
    ec_pid: PidTrack,
    effects: EffectivenessTracker,
}

impl<S, P, C> core::fmt::Debug for AutoDoserCore<S, P, C>
where
    S: SensorSource + Send + 'static,
    P: PumpActuator,
    C: ConfigStore,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AutoDoserCore")
            .field("fail_count", &self.breaker.fail_count())
            .field("cycle_in_flight", &self.guard.is_locked())
            .field("doses_recorded", &self.history.len())
            .finish()
    }
}

impl<S, P, C> AutoDoserCore<S, P, C>
where
    S: SensorSource + Send + 'static,
    P: PumpActuator,
    C: ConfigStore,
{
    #[inline]
    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    /// Handle for the management surface to toggle monitoring.
    pub fn monitoring(&self) -> MonitoringControl {
        self.control.clone()
    }

    /// Advisory multiplier currently applied to `pump`'s base dose.
    pub fn dose_factor(&self, pump: PumpRole) -> f64 {
        self.effects.dose_factor(pump)
    }

    /// Run one dosing cycle. Never dispenses more than once, and always
    /// returns exactly one terminal outcome.
    pub fn perform_cycle(&mut self) -> CycleOutcome {
        let now_ms = self.now_ms();

        // 1) attempt limiter — the stamp moves on every call, including
        //    refused ones.
        if let Some(remaining_ms) = self.guard.note_attempt(now_ms) {
            tracing::debug!(remaining_ms, "cycle refused: attempt interval");
            return CycleOutcome::WaitingRate(RateHold::AttemptInterval { remaining_ms });
        }

        // 2) startup safety delay
        if now_ms < self.engine.startup_delay_ms {
            let remaining_ms = self.engine.startup_delay_ms - now_ms;
            tracing::debug!(remaining_ms, "cycle refused: startup delay");
            return CycleOutcome::WaitingRate(RateHold::Startup { remaining_ms });
        }

        // 3) kill switch
        if !self.control.is_enabled() {
            self.effects.cancel_all();
            tracing::warn!("cycle aborted: monitoring disabled");
            return CycleOutcome::Aborted {
                reason: "monitoring disabled",
            };
        }

        // One config read per cycle; concurrent management writes cannot
        // tear an in-flight decision.
        let config = self.store.get();

        // 4) master switch
        if !config.enabled {
            return CycleOutcome::Disabled;
        }

        // 5) circuit breaker
        if self.breaker.is_open(now_ms) {
            let resets_at_ms = self.breaker.resets_at_ms().unwrap_or(now_ms);
            tracing::warn!(
                resets_at_ms,
                fail_count = self.breaker.fail_count(),
                "cycle skipped: circuit open"
            );
            return CycleOutcome::CircuitOpen { resets_at_ms };
        }

        // 6) single-flight lock
        let Some(permit) = self.guard.try_acquire(now_ms) else {
            tracing::debug!("cycle refused: lock held");
            return CycleOutcome::WaitingLock;
        };

        // The permit also releases on drop, so an early return below (or a
        // panic) cannot leak the lock.
        let outcome = self.evaluate(&config, now_ms);
        permit.release();
        outcome
    }

    fn evaluate(&mut self, config: &DosingConfig, now_ms: u64) -> CycleOutcome {
        // 7) fresh reading with per-value fallbacks
        let raw = match self.read_sensor() {
            Ok(r) => r,
            Err(err) => {
                tracing::error!(error = %err, "cycle failed: no sensor reading");
                self.note_failure(now_ms);
                return CycleOutcome::Failed(err);
            }
        };
        let (ph, ph_substituted) = sanitize_ph(raw.ph);
        let (ec, ec_substituted) = sanitize_ec(raw.ec);
        if ph_substituted && ec_substituted {
            let err = CycleError::SensorUnavailable(
                "pH and EC readings both missing or out of range".to_string(),
            );
            tracing::error!(raw_ph = raw.ph, raw_ec = raw.ec, "cycle failed: all readings unusable");
            self.note_failure(now_ms);
            return CycleOutcome::Failed(err);
        }
        if ph_substituted {
            tracing::warn!(raw = raw.ph, fallback = PH_FALLBACK, "pH reading unusable; substituted");
        }
        if ec_substituted {
            tracing::warn!(raw = raw.ec, fallback = EC_FALLBACK, "EC reading unusable; substituted");
        }
        tracing::debug!(ph, ec, water_temp_c = raw.water_temp_c, "reservoir reading");

        let ph_band = config.targets.ph;
        let ec_band = config.targets.ec;

        // 8) pH low -> raise
        if ph < ph_band.low() {
            return self.try_dose(
                Parameter::Ph,
                PumpRole::PhUp,
                ph,
                ph_band.target,
                config.pumps.by_role(PumpRole::PhUp),
                now_ms,
            );
        }

        // 9) pH high -> lower
        if ph > ph_band.high() {
            return self.try_dose(
                Parameter::Ph,
                PumpRole::PhDown,
                ph,
                ph_band.target,
                config.pumps.by_role(PumpRole::PhDown),
                now_ms,
            );
        }

        // 10) EC low -> feed nutrients
        if ec < ec_band.low() {
            return self.try_dose(
                Parameter::Ec,
                PumpRole::Nutrient,
                ec,
                ec_band.target,
                config.pumps.by_role(PumpRole::Nutrient),
                now_ms,
            );
        }

        // 11) EC high: no automatic remedy (requires dilution / water
        //     change). Detected, surfaced, and deliberately not recorded
        //     as a success.
        if ec > ec_band.high() {
            tracing::warn!(ec, target = ec_band.target, "EC above range; dilution required");
            return CycleOutcome::Warning {
                parameter: Parameter::Ec,
                reading: ec,
                target: ec_band.target,
            };
        }

        // 12) everything within tolerance
        self.note_success();
        CycleOutcome::InRange
    }

    fn try_dose(
        &mut self,
        parameter: Parameter,
        pump: PumpRole,
        reading: f64,
        target: f64,
        settings: &PumpSettings,
        now_ms: u64,
    ) -> CycleOutcome {
        if let Err(hold) = gate::can_dose(pump, settings, now_ms, &self.history) {
            tracing::info!(pump = pump.label(), ?hold, "dose held by interval gate");
            return CycleOutcome::WaitingInterval { pump, hold };
        }

        // The lowering pump sees the inverted pair so that a positive
        // error always means "dispense more of this reagent". One PID
        // state per parameter: both pH pumps share the pH track.
        let (current, setpoint) = if pump == PumpRole::PhDown {
            (target, reading)
        } else {
            (reading, target)
        };

        let track = match parameter {
            Parameter::Ph => &mut self.ph_pid,
            Parameter::Ec => &mut self.ec_pid,
        };
        if track.gains != settings.gains {
            tracing::debug!(parameter = parameter.label(), "gains changed; PID state reset");
            track.state = PidState::default();
            track.gains = settings.gains;
        }
        let state = track.state;

        let factor = self.effects.dose_factor(pump);
        let (amount_ml, next_state) = pid::compute_dose(
            current,
            setpoint,
            settings.gains,
            settings.dose_ml * factor,
            state,
            now_ms,
        );

        match self.pumps.dispense(pump, amount_ml, settings.flow_rate_ml_s) {
            Ok(()) => {
                match parameter {
                    Parameter::Ph => self.ph_pid.state = next_state,
                    Parameter::Ec => self.ec_pid.state = next_state,
                }
                self.history.record(pump, amount_ml, now_ms);
                self.note_success();

                let expected_delta = {
                    let magnitude = amount_ml * settings.expected_shift_per_ml;
                    if pump == PumpRole::PhDown { -magnitude } else { magnitude }
                };
                let sensor = Arc::clone(&self.sensor);
                self.effects
                    .schedule_check(pump, parameter, reading, expected_delta, move || {
                        let mut probe = sensor.lock().ok()?;
                        let r = probe.read().ok()?;
                        Some(match parameter {
                            Parameter::Ph => r.ph,
                            Parameter::Ec => r.ec,
                        })
                    });

                tracing::info!(
                    pump = pump.label(),
                    amount_ml,
                    reading,
                    target,
                    "dose dispensed"
                );
                CycleOutcome::Dosed {
                    pump,
                    parameter,
                    amount_ml,
                    reading,
                    target,
                }
            }
            Err(e) => {
                let err = mapping::map_actuator_error(pump, &*e);
                tracing::error!(pump = pump.label(), error = %err, "dispense failed");
                self.note_failure(now_ms);
                CycleOutcome::Failed(err)
            }
        }
    }

    fn read_sensor(&self) -> Result<SensorReading, CycleError> {
        let mut probe = self.sensor.lock().unwrap_or_else(PoisonError::into_inner);
        probe.read().map_err(|e| mapping::map_sensor_error(&*e))
    }

    fn note_failure(&mut self, now_ms: u64) {
        self.breaker.record_failure(now_ms);
        self.store.update(ConfigPatch::breaker_counters(
            self.breaker.fail_count(),
            self.breaker.last_failure_ms(),
        ));
    }

    fn note_success(&mut self) {
        if self.breaker.fail_count() > 0 {
            self.breaker.record_success();
            self.store
                .update(ConfigPatch::breaker_counters(0, self.breaker.last_failure_ms()));
        }
    }

    pub fn status(&self) -> EngineStatus {
        let now_ms = self.now_ms();
        let config = self.store.get();
        EngineStatus {
            config_enabled: config.enabled,
            monitoring_enabled: self.control.is_enabled(),
            circuit_open: self.breaker.is_open(now_ms),
            fail_count: self.breaker.fail_count(),
            circuit_resets_at_ms: self.breaker.resets_at_ms(),
            cycle_in_flight: self.guard.is_locked(),
            uptime_ms: now_ms,
            last_dose: self.history.last().copied(),
            doses_last_24h: self
                .history
                .iter()
                .filter(|r| now_ms.saturating_sub(r.at_ms) <= DAILY_WINDOW_MS)
                .count(),
            pending_effect_checks: self.effects.pending_checks(),
        }
    }
}

/// Build a generic, statically-dispatched engine from concrete collaborators.
pub fn build_doser<S, P, C>(
    sensor: S,
    pumps: P,
    store: C,
    engine: EngineCfg,
    control: Option<MonitoringControl>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> CoreResult<AutoDoserCore<S, P, C>>
where
    S: SensorSource + Send + 'static,
    P: PumpActuator,
    C: ConfigStore,
{
    if engine.min_attempt_interval_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "min_attempt_interval_ms must be >= 1",
        )));
    }
    if engine.max_lock_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "max_lock_ms must be >= 1",
        )));
    }
    if engine.effect_check_delay_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "effect_check_delay_ms must be >= 1",
        )));
    }

    let control = control.unwrap_or_default();
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    let epoch = clock.now();

    // Resume the breaker from persisted counters.
    let breaker = CircuitBreaker::from_counters(&store.get().error_handling);

    Ok(AutoDoserCore {
        sensor: Arc::new(Mutex::new(sensor)),
        pumps,
        store,
        control,
        clock,
        epoch,
        guard: CycleGuard::new(engine.min_attempt_interval_ms, engine.max_lock_ms),
        effects: EffectivenessTracker::new(Duration::from_millis(engine.effect_check_delay_ms)),
        engine,
        breaker,
        history: DoseHistory::new(),
        ph_pid: PidTrack::default(),
        ec_pid: PidTrack::default(),
    })
}

type BoxedSensor = Box<dyn SensorSource + Send>;
type BoxedPumps = Box<dyn PumpActuator>;
type BoxedStore = Box<dyn ConfigStore>;

/// Public dynamic (boxed) engine preserving an ergonomic API via composition.
pub struct AutoDoser {
    inner: AutoDoserCore<BoxedSensor, BoxedPumps, BoxedStore>,
}

impl core::fmt::Debug for AutoDoser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.inner, f)
    }
}

impl AutoDoser {
    /// Start building an engine.
    pub fn builder() -> AutoDoserBuilder<Missing, Missing, Missing> {
        AutoDoserBuilder::default()
    }

    /// Run one dosing cycle.
    pub fn perform_cycle(&mut self) -> CycleOutcome {
        self.inner.perform_cycle()
    }

    pub fn status(&self) -> EngineStatus {
        self.inner.status()
    }

    /// Handle for the management surface to toggle monitoring.
    pub fn monitoring(&self) -> MonitoringControl {
        self.inner.monitoring()
    }
}

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

/// Builder for `AutoDoser`. Collaborators advance the type-state; `build`
/// is only available once sensor, pumps, and store are all provided.
pub struct AutoDoserBuilder<SensorState, PumpState, StoreState> {
    sensor: Option<BoxedSensor>,
    pumps: Option<BoxedPumps>,
    store: Option<BoxedStore>,
    engine: Option<EngineCfg>,
    control: Option<MonitoringControl>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _s: PhantomData<SensorState>,
    _p: PhantomData<PumpState>,
    _c: PhantomData<StoreState>,
}

impl Default for AutoDoserBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            sensor: None,
            pumps: None,
            store: None,
            engine: None,
            control: None,
            clock: None,
            _s: PhantomData,
            _p: PhantomData,
            _c: PhantomData,
        }
    }
}

impl<SensorState, PumpState, StoreState> AutoDoserBuilder<SensorState, PumpState, StoreState> {
    /// Fallible build available in any type-state; returns a typed
    /// BuildError for missing pieces.
    pub fn try_build(self) -> CoreResult<AutoDoser> {
        let AutoDoserBuilder {
            sensor,
            pumps,
            store,
            engine,
            control,
            clock,
            _s: _,
            _p: _,
            _c: _,
        } = self;

        let sensor = sensor.ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let pumps = pumps.ok_or_else(|| eyre::Report::new(BuildError::MissingPumps))?;
        let store = store.ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;

        let inner = build_doser(sensor, pumps, store, engine.unwrap_or_default(), control, clock)?;
        Ok(AutoDoser { inner })
    }

    pub fn with_engine_cfg(mut self, engine: EngineCfg) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Share a monitoring handle with the management surface.
    pub fn with_control(mut self, control: MonitoringControl) -> Self {
        self.control = Some(control);
        self
    }

    /// Provide a custom clock; defaults to MonotonicClock when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl<PumpState, StoreState> AutoDoserBuilder<Missing, PumpState, StoreState> {
    pub fn with_sensor(
        self,
        sensor: impl SensorSource + Send + 'static,
    ) -> AutoDoserBuilder<Set, PumpState, StoreState> {
        let AutoDoserBuilder {
            sensor: _,
            pumps,
            store,
            engine,
            control,
            clock,
            _s: _,
            _p: _,
            _c: _,
        } = self;
        AutoDoserBuilder {
            sensor: Some(Box::new(sensor)),
            pumps,
            store,
            engine,
            control,
            clock,
            _s: PhantomData,
            _p: PhantomData,
            _c: PhantomData,
        }
    }
}

impl<SensorState, StoreState> AutoDoserBuilder<SensorState, Missing, StoreState> {
    pub fn with_pumps(
        self,
        pumps: impl PumpActuator + 'static,
    ) -> AutoDoserBuilder<SensorState, Set, StoreState> {
        let AutoDoserBuilder {
            sensor,
            pumps: _,
            store,
            engine,
            control,
            clock,
            _s: _,
            _p: _,
            _c: _,
        } = self;
        AutoDoserBuilder {
            sensor,
            pumps: Some(Box::new(pumps)),
            store,
            engine,
            control,
            clock,
            _s: PhantomData,
            _p: PhantomData,
            _c: PhantomData,
        }
    }
}

impl<SensorState, PumpState> AutoDoserBuilder<SensorState, PumpState, Missing> {
    pub fn with_store(
        self,
        store: impl ConfigStore + 'static,
    ) -> AutoDoserBuilder<SensorState, PumpState, Set> {
        let AutoDoserBuilder {
            sensor,
            pumps,
            store: _,
            engine,
            control,
            clock,
            _s: _,
            _p: _,
            _c: _,
        } = self;
        AutoDoserBuilder {
            sensor,
            pumps,
            store: Some(Box::new(store)),
            engine,
            control,
            clock,
            _s: PhantomData,
            _p: PhantomData,
            _c: PhantomData,
        }
    }
}

impl AutoDoserBuilder<Set, Set, Set> {
    /// Validate and build. Only available when all collaborators are set.
    pub fn build(self) -> CoreResult<AutoDoser> {
        self.try_build()
    }
}
