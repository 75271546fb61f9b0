//! The harness scenarios
//!
//! Each scenario creates its own objects, so they can run in any order and
//! one failing does not stop the rest.

use crate::bindings::BindingSet;
use crate::error::HarnessError;
use crate::harness::Harness;
use crate::proxies::{clsid, progid, Address, IDog, IHen, IPetShop};
use comharness_servers::{AtlCluckObserver, Postman};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

/// Concurrent callers in [`free_threaded_hen_cluck`]
const CONCURRENT_CLUCKS: usize = 8;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error("assertion failed: {0}")]
    Assertion(String),
}

type ScenarioResult = Result<(), ScenarioError>;
type ScenarioFn = for<'a> fn(&'a Harness, &'a Arc<BindingSet>) -> BoxFuture<'a, ScenarioResult>;

macro_rules! ensure_eq {
    ($left:expr, $right:expr) => {{
        let (left, right) = (&$left, &$right);
        if left != right {
            return Err(ScenarioError::Assertion(format!(
                "{} == {}: {:?} != {:?}",
                stringify!($left),
                stringify!($right),
                left,
                right
            )));
        }
    }};
}

#[derive(Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    run: ScenarioFn,
}

impl Scenario {
    pub async fn run(&self, harness: &Harness, bindings: &Arc<BindingSet>) -> ScenarioResult {
        (self.run)(harness, bindings).await
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish()
    }
}

pub fn all() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "petshop_get_address",
            description: "PetShop.GetAddress returns the shop's address",
            run: |h, b| Box::pin(petshop_get_address(h, b)),
        },
        Scenario {
            name: "hen_cluck",
            description: "AtlHen, created by CLSID, clucks",
            run: |h, b| Box::pin(hen_cluck(h, b)),
        },
        Scenario {
            name: "petshop_buy_dog_sit",
            description: "A dog bought from the PetShop sits",
            run: |h, b| Box::pin(petshop_buy_dog_sit(h, b)),
        },
        Scenario {
            name: "guard_dog_bites_postman",
            description: "GuardDog.Bite calls the postman back",
            run: |h, b| Box::pin(guard_dog_bites_postman(h, b)),
        },
        Scenario {
            name: "hen_cluck_async",
            description: "AtlHen.CluckAsync calls the observer back",
            run: |h, b| Box::pin(hen_cluck_async(h, b)),
        },
        Scenario {
            name: "free_threaded_hen_cluck",
            description: "FreeThreadedHen answers concurrent callers",
            run: |h, b| Box::pin(free_threaded_hen_cluck(h, b)),
        },
    ]
}

pub fn find(name: &str) -> Option<Scenario> {
    all().into_iter().find(|s| s.name == name)
}

async fn petshop_get_address(harness: &Harness, bindings: &Arc<BindingSet>) -> ScenarioResult {
    let binding = bindings.interface(IPetShop::NAME)?;
    let shop = IPetShop::from_handle(harness.create_object(progid::PET_SHOP, binding).await?)?;
    let address = shop.get_address().await?;
    ensure_eq!(
        address,
        Address {
            street: "Suhms gate".to_string(),
            postal_code: "0363".to_string(),
            city: "Oslo".to_string(),
        }
    );
    Ok(())
}

async fn hen_cluck(harness: &Harness, bindings: &Arc<BindingSet>) -> ScenarioResult {
    let binding = bindings.interface(IHen::NAME)?;
    let hen = IHen::from_handle(harness.create_object(clsid::ATL_HEN, binding).await?)?;
    hen.cluck().await?;
    Ok(())
}

async fn petshop_buy_dog_sit(harness: &Harness, bindings: &Arc<BindingSet>) -> ScenarioResult {
    let binding = bindings.interface(IPetShop::NAME)?;
    let shop = IPetShop::from_handle(harness.create_object(progid::PET_SHOP, binding).await?)?;
    let dog = shop.buy_dog().await?;
    ensure_eq!(dog.handle().interface_name(), IDog::NAME);
    dog.sit().await?;
    Ok(())
}

async fn guard_dog_bites_postman(harness: &Harness, bindings: &Arc<BindingSet>) -> ScenarioResult {
    let binding = bindings.interface(IDog::NAME)?;
    let dog = IDog::from_handle(harness.create_object(progid::GUARD_DOG, binding).await?)?;

    let postman = Arc::new(Postman::new());
    let callback = harness.export_callback(postman.clone()).await?;
    dog.bite(&callback).await?;
    ensure_eq!(postman.bites(), 1);
    Ok(())
}

async fn hen_cluck_async(harness: &Harness, bindings: &Arc<BindingSet>) -> ScenarioResult {
    let binding = bindings.interface(IHen::NAME)?;
    let hen = IHen::from_handle(harness.create_object(progid::ATL_HEN, binding).await?)?;

    let observer = Arc::new(AtlCluckObserver::new());
    let callback = harness.export_callback(observer.clone()).await?;
    hen.cluck_async(&callback).await?;
    hen.cluck_async(&callback).await?;
    ensure_eq!(observer.clucks(), 2);
    Ok(())
}

async fn free_threaded_hen_cluck(harness: &Harness, bindings: &Arc<BindingSet>) -> ScenarioResult {
    let binding = bindings.interface(IHen::NAME)?;
    let hen = IHen::from_handle(harness.create_object(progid::FREE_THREADED_HEN, binding).await?)?;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..CONCURRENT_CLUCKS {
        let hen = IHen::from_handle(hen.handle().with_own_connection()?)?;
        tasks.spawn(async move { hen.cluck().await });
    }
    let mut answered = 0;
    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| ScenarioError::Assertion(format!("cluck task failed: {e}")))??;
        answered += 1;
    }
    ensure_eq!(answered, CONCURRENT_CLUCKS);
    Ok(())
}

/// How one scenario went
#[derive(Debug)]
pub struct Outcome {
    pub name: &'static str,
    pub elapsed: Duration,
    pub result: ScenarioResult,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct Report {
    pub outcomes: Vec<Outcome>,
}

impl Report {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(()) => writeln!(f, "PASS {} ({:?})", outcome.name, outcome.elapsed)?,
                Err(e) => writeln!(f, "FAIL {}: {e}", outcome.name)?,
            }
        }
        write!(f, "{} passed, {} failed", self.passed(), self.failed())
    }
}

/// Run `scenarios` one after another, carrying on past failures.
pub async fn run(harness: &Harness, bindings: &Arc<BindingSet>, scenarios: &[Scenario]) -> Report {
    let mut report = Report::default();
    for scenario in scenarios {
        let started = Instant::now();
        let result = scenario.run(harness, bindings).await;
        let elapsed = started.elapsed();
        match &result {
            Ok(()) => info!(scenario = scenario.name, ?elapsed, "scenario passed"),
            Err(e) => error!(scenario = scenario.name, error = %e, "scenario failed"),
        }
        report.outcomes.push(Outcome { name: scenario.name, elapsed, result });
    }
    report
}
