//! Supervisor integration tests over the scripted chain driver.
//!
//! These cover the discovery / measure / publish loop end to end:
//! probe commitment, the retry-once rule, fault recovery and the
//! serialization of aux traffic against chain scans.

use std::sync::Arc;

use batsrv::chain::mock::{ChainCall, MockChain};
use batsrv::chain::{ChainSupervisor, CycleOutcome};
use batsrv::config::{AuxConfig, ChainConfig};
use batsrv::BatSrvError;

fn supervisor_over(mock: &MockChain) -> Arc<ChainSupervisor> {
    Arc::new(ChainSupervisor::new(
        Arc::new(mock.clone()),
        &ChainConfig::default(),
        AuxConfig::default(),
    ))
}

fn probe_sequence(calls: &[ChainCall]) -> Vec<usize> {
    calls
        .iter()
        .filter_map(|c| match c {
            ChainCall::Probe(n) => Some(*n),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_discovery_commits_to_last_answering_length() {
    let mock = MockChain::new();
    mock.script_probes(&[true, true, true]);

    let supervisor = supervisor_over(&mock);
    let outcome = supervisor.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Published { banks: 3 });
    assert_eq!(supervisor.status().chain_length, 3);
    assert_eq!(supervisor.latest().unwrap().banks.len(), 3);
    // Probing walked 1, 2, 3 and stopped at the first refusal
    assert_eq!(probe_sequence(&mock.calls()), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_empty_bus_is_a_normal_state() {
    let mock = MockChain::new();

    let supervisor = supervisor_over(&mock);
    let outcome = supervisor.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::NoDevices);
    assert!(supervisor.latest().is_none());
    assert_eq!(supervisor.error_count(), 0);
    // No initialise or scan without a chain
    assert_eq!(probe_sequence(&mock.calls()), vec![1]);
    assert_eq!(mock.calls().len(), 1);
}

#[tokio::test]
async fn test_double_voltage_failure_drops_chain_and_skips_temperatures() {
    let mock = MockChain::new();
    mock.script_probes(&[true, true]);

    let supervisor = supervisor_over(&mock);
    assert_eq!(
        supervisor.run_cycle().await.unwrap(),
        CycleOutcome::Published { banks: 2 }
    );
    let good = supervisor.latest().unwrap();
    assert!(good.banks[0].temperatures[0].is_some());

    // Both the scan and its retry fail
    mock.clear_calls();
    mock.script_voltages(&[false, false]);
    assert_eq!(supervisor.run_cycle().await.unwrap(), CycleOutcome::Fault);

    let calls = mock.calls();
    assert_eq!(
        calls,
        vec![ChainCall::MeasureVoltages(2), ChainCall::MeasureVoltages(2)]
    );
    assert_eq!(supervisor.error_count(), 1);
    assert_eq!(supervisor.status().chain_length, 0);
    // The last good snapshot stays published
    let stale = supervisor.latest().unwrap();
    assert_eq!(stale.captured_at, good.captured_at);

    // Next tick rediscovers from scratch and publishes again
    mock.clear_calls();
    mock.script_probes(&[true, true]);
    assert_eq!(
        supervisor.run_cycle().await.unwrap(),
        CycleOutcome::Published { banks: 2 }
    );
    assert_eq!(probe_sequence(&mock.calls()), vec![1, 2, 3]);
    assert_eq!(supervisor.error_count(), 1);
    assert_eq!(supervisor.status().chain_length, 2);
}

#[tokio::test]
async fn test_single_voltage_failure_recovers_on_retry() {
    let mock = MockChain::new();
    mock.script_probes(&[true, true]);

    let supervisor = supervisor_over(&mock);
    supervisor.run_cycle().await.unwrap();

    mock.clear_calls();
    mock.script_voltages(&[false, true]);
    let outcome = supervisor.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Published { banks: 2 });
    assert_eq!(supervisor.error_count(), 0);
    assert_eq!(
        mock.calls(),
        vec![
            ChainCall::MeasureVoltages(2),
            ChainCall::MeasureVoltages(2),
            ChainCall::MeasureTemperatures(2),
        ]
    );
}

#[tokio::test]
async fn test_double_temperature_failure_publishes_voltages_and_drops_chain() {
    let mock = MockChain::new();
    mock.script_probes(&[true]);

    let supervisor = supervisor_over(&mock);
    supervisor.run_cycle().await.unwrap();
    assert!(supervisor.latest().unwrap().banks[0].temperatures[0].is_some());

    mock.clear_calls();
    mock.script_temperatures(&[false, false]);
    let outcome = supervisor.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Fault);
    assert_eq!(
        mock.calls(),
        vec![
            ChainCall::MeasureVoltages(1),
            ChainCall::MeasureTemperatures(1),
            ChainCall::MeasureTemperatures(1),
        ]
    );

    // Voltages published, every temperature slot absent; stale
    // temperatures from the previous cycle must not leak through
    let snapshot = supervisor.latest().unwrap();
    let bank = &snapshot.banks[0];
    assert!(bank.cells[0] > 3.0);
    assert!(bank.temperatures.iter().all(|t| t.is_none()));
    assert_eq!(bank.ref_volts, None);
    assert_eq!(bank.sum_of_cells, None);

    // A temperature fault counts like a voltage fault: the chain goes
    // back to unknown
    assert_eq!(supervisor.error_count(), 1);
    assert_eq!(supervisor.status().chain_length, 0);

    // The next cycle rediscovers from scratch and temperatures return
    mock.clear_calls();
    mock.script_probes(&[true]);
    assert_eq!(
        supervisor.run_cycle().await.unwrap(),
        CycleOutcome::Published { banks: 1 }
    );
    assert_eq!(probe_sequence(&mock.calls()), vec![1, 2]);
    assert_eq!(supervisor.status().chain_length, 1);
    assert!(supervisor.latest().unwrap().banks[0].temperatures[0].is_some());
}

#[tokio::test]
async fn test_aux_faults_do_not_count_as_measurement_errors() {
    let mock = MockChain::new();
    mock.script_probes(&[true]);

    let supervisor = supervisor_over(&mock);
    supervisor.run_cycle().await.unwrap();

    mock.set_fail_aux(true);
    let err = supervisor.aux_read(0, 0x64, 0x0E).await.unwrap_err();
    assert!(matches!(err, BatSrvError::Bus(_)));

    // The counter and the chain are untouched
    assert_eq!(supervisor.error_count(), 0);
    assert_eq!(supervisor.status().chain_length, 1);

    mock.set_fail_aux(false);
    assert_eq!(
        supervisor.run_cycle().await.unwrap(),
        CycleOutcome::Published { banks: 1 }
    );
}

#[tokio::test]
async fn test_out_of_range_device_rejected_before_the_bus() {
    let mock = MockChain::new();
    mock.script_probes(&[true, true]);

    let supervisor = supervisor_over(&mock);
    supervisor.run_cycle().await.unwrap();
    mock.clear_calls();

    let err = supervisor.aux_read(5, 0x64, 0x0E).await.unwrap_err();
    assert!(matches!(err, BatSrvError::AddressOutOfRange(_)));
    let err = supervisor.aux_write(2, 0x64, 0x01, 0x3C).await.unwrap_err();
    assert!(matches!(err, BatSrvError::AddressOutOfRange(_)));

    // The rejection happened before any bus transaction
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_aux_requires_a_discovered_chain() {
    let mock = MockChain::new();
    let supervisor = supervisor_over(&mock);

    let err = supervisor.aux_read(0, 0x64, 0x0E).await.unwrap_err();
    assert!(matches!(err, BatSrvError::NoDevices));
    assert!(mock.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aux_traffic_serializes_against_chain_scans() {
    let mock = MockChain::new();
    mock.script_probes(&[true, true]);

    let supervisor = supervisor_over(&mock);
    supervisor.run_cycle().await.unwrap();

    let cycles = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            for _ in 0..20 {
                supervisor.run_cycle().await.unwrap();
            }
        })
    };
    let reads = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            for _ in 0..50 {
                let _ = supervisor.aux_read(0, 0x64, 0x0E).await;
            }
        })
    };
    let gauges = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            for _ in 0..50 {
                let _ = supervisor.aux_voltage(1).await;
            }
        })
    };

    cycles.await.unwrap();
    reads.await.unwrap();
    gauges.await.unwrap();

    // The single bus lock means no two transactions ever overlapped
    assert!(!mock.overlap_detected());
}
