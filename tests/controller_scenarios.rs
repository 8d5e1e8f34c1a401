//! End-to-end controller scenarios against the mock hardware.

use std::sync::Arc;
use std::time::Duration;

use transmeas::config::Settings;
use transmeas::controller::{ActiveRegime, FieldController, RampController, StopPolicy};
use transmeas::error::TransmeasError;
use transmeas::hardware::mock::{
    MockAdrStage, MockCurrentSource, MockHeaterStage, MockMagnet, MockThermometer, MockVoltmeter,
};
use transmeas::hardware::{AdrControl, HeaterControl};
use transmeas::measurement::iv::{IvSweep, SweepPlan};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn quick_stop_policy() -> StopPolicy {
    StopPolicy {
        poll_interval: Duration::from_millis(1),
        max_polls: 10,
    }
}

async fn ramp_controller(
    heater: MockHeaterStage,
    adr: MockAdrStage,
) -> RampController {
    init_logging();
    let settings = Settings::default();
    RampController::new(
        Box::new(heater),
        Box::new(adr),
        settings.cryostat.boundaries,
        quick_stop_policy(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn regime_switch_keeps_at_most_one_stage_active() {
    let heater = MockHeaterStage::new();
    let adr = MockAdrStage::new();
    let ctrl = ramp_controller(heater.clone(), adr.clone()).await;

    ctrl.set_target_temperature(150.0, 2.0).await.unwrap();
    assert!(heater.is_active().await.unwrap());
    assert!(!adr.is_active().await.unwrap());

    ctrl.set_target_temperature(0.5, 0.2).await.unwrap();
    assert!(!heater.is_active().await.unwrap());
    assert!(adr.is_active().await.unwrap());
    assert_eq!(ctrl.active_regime().await, ActiveRegime::LowTempAdr);
    assert_eq!(ctrl.target().await, Some((0.5, 0.2)));

    ctrl.set_target_temperature(20.0, 1.0).await.unwrap();
    assert!(heater.is_active().await.unwrap());
    assert!(!adr.is_active().await.unwrap());
}

#[tokio::test]
async fn wait_until_stable_returns_once_stage_settles() {
    let heater = MockHeaterStage::with_settle_time(Duration::from_millis(30));
    let adr = MockAdrStage::new();
    let ctrl = ramp_controller(heater, adr).await;

    ctrl.set_target_temperature(100.0, 1.0).await.unwrap();
    ctrl.wait_until_stable(Duration::from_millis(10), Duration::from_millis(50))
        .await
        .unwrap();
    assert!(ctrl.is_stable().await.unwrap());
}

#[tokio::test]
async fn wait_until_stable_times_out_against_drifting_stage() {
    let heater = MockHeaterStage::with_settle_time(Duration::MAX);
    let adr = MockAdrStage::new();
    let ctrl = ramp_controller(heater, adr).await;

    ctrl.set_target_temperature(100.0, 1.0).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = ctrl
        .wait_until_stable(Duration::from_millis(10), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, TransmeasError::StabilizationTimeout { .. }));
    // Expired close to the requested timeout, allowing scheduling slack.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(250));
}

#[tokio::test]
async fn abort_unblocks_a_waiting_task() {
    let heater = MockHeaterStage::with_settle_time(Duration::MAX);
    let adr = MockAdrStage::new();
    let ctrl = Arc::new(ramp_controller(heater, adr).await);

    ctrl.set_target_temperature(100.0, 1.0).await.unwrap();

    let waiter = {
        let ctrl = Arc::clone(&ctrl);
        tokio::spawn(async move {
            ctrl.wait_until_stable(Duration::from_millis(5), Duration::from_secs(10))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    ctrl.abort().await;

    let result = tokio::time::timeout(Duration::from_millis(200), waiter)
        .await
        .expect("waiter should unblock promptly after abort")
        .unwrap();
    assert!(matches!(
        result,
        Err(TransmeasError::ControllerNotInitialized)
    ));
}

#[tokio::test]
async fn stuck_stage_surfaces_stop_timeout_and_leaves_new_stage_untouched() {
    let heater = MockHeaterStage::new();
    let adr = MockAdrStage::new().stuck();
    let ctrl = ramp_controller(heater.clone(), adr.clone()).await;

    ctrl.set_target_temperature(1.0, 0.2).await.unwrap();
    let err = ctrl.set_target_temperature(100.0, 1.0).await.unwrap_err();
    assert!(matches!(
        err,
        TransmeasError::BackendStopTimeout {
            backend: "adr_control",
            ..
        }
    ));
    assert_eq!(heater.start_count().await, 0);
}

#[tokio::test]
async fn field_ramp_refused_on_warm_sample_then_accepted_after_cooldown() {
    init_logging();
    let settings = Settings::default();
    let magnet = MockMagnet::new();
    let thermo = MockThermometer::new(250.0);
    let ctrl = FieldController::new(
        Box::new(magnet.clone()),
        Box::new(thermo.clone()),
        settings.magnet.regime().unwrap(),
        settings.magnet.max_safe_sample_temperature,
    )
    .unwrap();

    let err = ctrl.set_target_field(1.0, 0.2).await.unwrap_err();
    assert!(matches!(err, TransmeasError::UnsafeTemperature { .. }));
    assert_eq!(magnet.start_count().await, 0);

    thermo.set_kelvin(4.2).await;
    ctrl.set_target_field(1.0, 0.2).await.unwrap();
    ctrl.wait_until_stable(Duration::from_millis(10), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(ctrl.field().await.unwrap(), 1.0);
}

#[tokio::test]
async fn iv_sweep_runs_after_temperature_is_stable() {
    let heater = MockHeaterStage::with_settle_time(Duration::from_millis(10));
    let adr = MockAdrStage::new();
    let ctrl = ramp_controller(heater, adr).await;

    ctrl.set_target_temperature(4.0, 1.0).await.unwrap();
    ctrl.wait_until_stable(Duration::from_millis(5), Duration::from_millis(100))
        .await
        .unwrap();

    let source = MockCurrentSource::new();
    let meter = MockVoltmeter::ohmic(source.clone(), 470.0);
    let sweep = IvSweep::new(
        "iv_vs_t",
        "nb_wire",
        Arc::new(source.clone()),
        Arc::new(meter),
        "mock_meter",
    );
    let plan = SweepPlan {
        start: -1e-6,
        stop: 1e-6,
        points: 11,
        settle: Duration::from_millis(1),
    };
    let data = sweep.run(&plan).await.unwrap();

    assert_eq!(data.len(), 11);
    assert_eq!(source.history().await.len(), 11);
    // Symmetric grid: middle point is zero bias, zero voltage.
    assert!(data[5].value.abs() < 1e-12);
    assert!((data[10].value - 470.0 * 1e-6).abs() < 1e-12);
}
