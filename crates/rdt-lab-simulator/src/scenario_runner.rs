use anyhow::{Context, anyhow, bail};
use rdt_lab_abstract::{SimConfig, TestAction, TestAssertion, TestScenario};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::Simulator;
use crate::feed::{CollectingSink, ScriptedFeed};
use crate::trace::SimulationReport;

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse scenario")
}

pub async fn run_scenario(path: &Path) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run(&scenario).await
}

/// Run `scenario` and check every assertion against the finished session.
pub async fn run(scenario: &TestScenario) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {} ({})", scenario.name, scenario.generation);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    if let Some(ms) = max_duration(scenario) {
        config.max_duration_ms = config.max_duration_ms.min(ms);
    }

    let feed = ScriptedFeed::new(scenario.messages());
    let mut sim = Simulator::new(
        scenario.generation,
        config,
        Box::new(feed),
        Box::new(CollectingSink::default()),
    );

    // Configure deterministic faults
    for action in &scenario.actions {
        match action {
            TestAction::AppSend { .. } => {}
            TestAction::DropForward { nth } => sim.add_drop_forward_once(*nth),
            TestAction::DropBackward { nth } => sim.add_drop_backward_once(*nth),
            TestAction::CorruptForward { nth } => sim.add_corrupt_forward_once(*nth),
            TestAction::CorruptBackward { nth } => sim.add_corrupt_backward_once(*nth),
        }
    }

    let report = sim
        .run_until_complete()
        .await
        .with_context(|| format!("Scenario {:?} did not complete", scenario.name))?;
    check_assertions(&scenario.assertions, &report)?;

    info!("Test Scenario Passed!");
    Ok(report)
}

fn max_duration(scenario: &TestScenario) -> Option<u64> {
    scenario.assertions.iter().find_map(|a| match a {
        TestAssertion::MaxDuration { ms } => Some(*ms),
        _ => None,
    })
}

pub fn check_assertions(
    assertions: &[TestAssertion],
    report: &SimulationReport,
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            TestAssertion::DataDelivered { data } => {
                if !report.delivered_data.iter().any(|d| d == data) {
                    bail!("Assertion Failed: Data {:?} was not delivered", data);
                }
            }
            TestAssertion::DeliveredExactly { data } => {
                if &report.delivered_data != data {
                    bail!(
                        "Assertion Failed: Delivered {:?}, expected exactly {:?}",
                        report.delivered_data,
                        data
                    );
                }
            }
            TestAssertion::DeliveryCount { min, max } => {
                check_range("Delivery count", report.delivered_data.len() as u32, *min, *max)?;
            }
            TestAssertion::SenderPacketCount { min, max } => {
                check_range("Sender packet count", report.sender_packet_count(), *min, *max)?;
            }
            TestAssertion::TimeoutCount { min, max } => {
                check_range("Timeout count", report.sender.timeouts, *min, *max)?;
            }
            TestAssertion::MaxDuration { ms } => {
                if report.duration_ms > *ms {
                    bail!(
                        "Assertion Failed: Session took {} ms, expected at most {}",
                        report.duration_ms,
                        ms
                    );
                }
            }
        }
    }
    Ok(())
}

fn check_range(what: &str, actual: u32, min: u32, max: Option<u32>) -> anyhow::Result<()> {
    if actual < min {
        return Err(anyhow!(
            "Assertion Failed: {} is {}, expected min {}",
            what,
            actual,
            min
        ));
    }
    if let Some(max) = max
        && actual > max
    {
        return Err(anyhow!(
            "Assertion Failed: {} is {}, expected max {}",
            what,
            actual,
            max
        ));
    }
    Ok(())
}
