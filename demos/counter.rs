//! A counter whose label is fetched once and whose count lives in procedure state.
//!
//! Run with: cargo run --example counter

use std::time::Duration;

use saga_kernel::prelude::*;
use tokio::sync::mpsc;

#[derive(Clone, Debug, Default)]
struct Counter {
    text: String,
    increment: Option<StateSetter>,
    count: i64,
}

fn counter(step: &i64) -> StepSequence<Counter> {
    let step = *step;
    StepSequence::new()
        .step("loading", |_, _| {
            Ok(render(Counter {
                text: "loading label...".to_string(),
                ..Counter::default()
            })
            .into())
        })
        .step("label", |_, _| {
            Ok(await_for_cached(
                || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, ProducerError>("clicks")
                },
                vec![],
            )
            .into())
        })
        .step("count", |locals, input| {
            locals.set("label", input.value()?);
            Ok(hold_state(0).into())
        })
        .step("view", move |locals, input| {
            locals.bind_state("count", input.state()?);
            let count = locals.value("count")?.as_int().unwrap_or_default();
            let label = locals.value("label")?.as_str().unwrap_or_default().to_string();
            Ok(Yielded::Complete(Counter {
                text: format!("{count} {label} (step {step})"),
                increment: locals.setter("count").cloned(),
                count: count + step,
            }))
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let (tx, mut rerender) = mpsc::unbounded_channel();
    let component = SagaComponent::new(counter, move || {
        let _ = tx.send(());
    });

    let mut shown = component.render(1)?;
    println!("{}", shown.text);
    let mut clicks = 0;
    while clicks < 3 {
        rerender.recv().await.ok_or("component dropped its rerender channel")?;
        shown = component.render(1)?;
        println!("{}", shown.text);
        if let Some(increment) = shown.increment.clone() {
            clicks += 1;
            increment.set(shown.count);
        }
    }
    rerender.recv().await.ok_or("component dropped its rerender channel")?;
    println!("{}", component.render(2)?.text);

    if let Some(instance) = component.current() {
        println!("{}", instance.timeline().to_json()?);
    }
    component.unmount();
    Ok(())
}
