mod cucumber;

use ::cucumber::{codegen::LocalBoxFuture, event::ScenarioFinished, gherkin, writer, World};
use futures_util::FutureExt;
use log::*;
use storefront_engine::StorefrontDatabase;
use tokio::runtime::Runtime;

use crate::cucumber::StorefrontWorld;

fn main() {
    dotenvy::from_filename(".env.test").ok();
    env_logger::init();
    let sys = Runtime::new().unwrap();
    sys.block_on(
        StorefrontWorld::cucumber()
            .with_writer(writer::Libtest::or_basic())
            .after(|_f, _r, scenario, ev, w| post_test_hook(scenario, ev, w))
            .run("tests/features"),
    );
    info!("🚀️ Tests complete");
}

fn post_test_hook<'a>(
    scenario: &'a gherkin::Scenario,
    ev: &'a ScenarioFinished,
    world: Option<&'a mut StorefrontWorld>,
) -> LocalBoxFuture<'a, ()> {
    let fut = async move {
        trace!("🚀️ After-scenario hook running for \"{}\"", scenario.name);
        let Some(store) = world.and_then(|w| w.store.take()) else {
            warn!("🚀️ World was not specified. Cannot cleanup database.");
            return;
        };
        match ev {
            ScenarioFinished::StepFailed(_, _, _) | ScenarioFinished::StepSkipped => {
                error!("🚀️ Error in scenario, database retained: {}", store.db.url());
            },
            ScenarioFinished::StepPassed => {
                debug!("🚀️ Scenario complete, removing database: {}", store.db.url());
                store.tear_down().await;
            },
            _ => trace!("🚀️ Unhandled event: {ev:?}"),
        }
        trace!("🚀️ After-scenario hook complete");
    };
    fut.boxed_local()
}
