use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use saga_kernel::kernel::{
    await_for, await_for_cached, compute, hold_state, procedure_fn, render, History,
    Interpreter, Memo, ProducerError, Resumption, ResumptionExt, SagaError, Signal, StateSetter,
    Status, StepSequence, Value, Yielded,
};
use tokio::sync::{mpsc, oneshot, Notify};

/// Proceeds `instance` until it terminates, waiting out every pending await.
async fn drive<A>(instance: &Interpreter<A>) -> Result<(), SagaError>
where
    A: Clone + Send + Sync + 'static,
{
    let _ = env_logger::builder().is_test(true).try_init();
    let wake = Arc::new(Notify::new());
    let notify = Arc::clone(&wake);
    let id = instance.subscribe(move |_| notify.notify_one());
    loop {
        instance.proceed()?;
        match instance.status() {
            Status::Terminated => break,
            Status::Running => wake.notified().await,
            Status::Paused => {}
        }
    }
    instance.unsubscribe(id);
    Ok(())
}

fn counted(calls: &Arc<AtomicUsize>) -> Arc<AtomicUsize> {
    Arc::clone(calls)
}

fn summary(name: &str, calls: Arc<AtomicUsize>) -> StepSequence<String> {
    let name = name.to_string();
    StepSequence::new()
        .step("sum", move |_, _| {
            let calls = Arc::clone(&calls);
            Ok(compute(
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    2 + 2
                },
                vec![],
            )
            .into())
        })
        .step("view", move |_, input| {
            let sum = input.value()?.as_int().unwrap_or_default();
            Ok(Yielded::Complete(format!(
                "Your name is {name} and the sum is: {sum}"
            )))
        })
}

#[test]
fn compute_with_empty_keys_runs_once_across_inputs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let memo = Memo::new();

    let roy = Interpreter::new(summary("Roy", counted(&calls)), memo.clone());
    roy.proceed().unwrap();
    let matan = Interpreter::new(summary("Matan", counted(&calls)), memo.clone());
    matan.proceed().unwrap();

    assert_eq!(roy.view(), "Your name is Roy and the sum is: 4");
    assert_eq!(matan.view(), "Your name is Matan and the sum is: 4");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn compute_reruns_when_keys_differ() {
    let calls = Arc::new(AtomicUsize::new(0));
    let memo = Memo::new();
    let super_name = |name: &'static str, calls: Arc<AtomicUsize>| -> StepSequence<String> {
        StepSequence::new()
            .step("super", move |_, _| {
                let calls = Arc::clone(&calls);
                Ok(compute(
                    move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        format!("Super {name}")
                    },
                    vec![Value::from(name)],
                )
                .into())
            })
            .step("view", |_, input| {
                let value = input.value()?;
                Ok(Yielded::Complete(format!(
                    "Your super name is {}",
                    value.as_str().unwrap_or_default()
                )))
            })
    };

    for name in ["Roy", "Roy", "Matan"] {
        let instance = Interpreter::new(super_name(name, counted(&calls)), memo.clone());
        instance.proceed().unwrap();
        assert_eq!(instance.view(), format!("Your super name is Super {name}"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(memo.len(), 2);
}

#[tokio::test]
async fn consecutive_renders_leave_only_the_last_visible() {
    let (tx, rx) = oneshot::channel::<&'static str>();
    let mut pending = Some(rx);
    let sequence: StepSequence<String> = StepSequence::new()
        .step("1", |_, _| Ok(render("1".to_string()).into()))
        .step("2", |_, _| Ok(render("2".to_string()).into()))
        .step("3", |_, _| Ok(render("3".to_string()).into()))
        .step("wait", move |_, _| {
            let rx = pending.take();
            Ok(await_for(move || async move {
                match rx {
                    Some(rx) => rx.await.map_err(ProducerError::from),
                    None => Err("already awaited".into()),
                }
            })
            .into())
        })
        .step("last", |_, input| {
            let word = input.value()?;
            Ok(Yielded::Complete(word.as_str().unwrap_or_default().to_string()))
        });
    let instance = Interpreter::new(sequence, Memo::new());

    instance.proceed().unwrap();
    assert_eq!(instance.status(), Status::Running);
    assert_eq!(instance.view(), "3");

    tx.send("last!").unwrap();
    drive(&instance).await.unwrap();
    assert_eq!(instance.view(), "last!");
}

#[derive(Clone, Debug, Default)]
struct Profile {
    text: String,
    rename: Option<StateSetter>,
}

fn profile(fetches: Arc<AtomicUsize>, lookups: Arc<AtomicUsize>) -> StepSequence<Profile> {
    StepSequence::new()
        .step("fetch", move |_, _| {
            let fetches = Arc::clone(&fetches);
            Ok(await_for(move || {
                fetches.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ProducerError>("ok") }
            })
            .into())
        })
        .step("name", |locals, input| {
            locals.set("fetched", input.value()?);
            Ok(hold_state("Roy").into())
        })
        .step("lookup", move |locals, input| {
            locals.bind_state("name", input.state()?);
            let name = locals.value("name")?.clone();
            let lookups = Arc::clone(&lookups);
            Ok(await_for(move || {
                lookups.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok::<_, ProducerError>(format!("{} details", name.as_str().unwrap_or_default()))
                }
            })
            .into())
        })
        .step("view", |locals, input| {
            let details = input.value()?;
            let fetched = locals.value("fetched")?;
            Ok(Yielded::Complete(Profile {
                text: format!(
                    "{} / {}",
                    details.as_str().unwrap_or_default(),
                    fetched.as_str().unwrap_or_default()
                ),
                rename: locals.setter("name").cloned(),
            }))
        })
}

#[tokio::test]
async fn state_fork_replays_the_prefix_and_reruns_the_rest() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let lookups = Arc::new(AtomicUsize::new(0));
    let memo = Memo::new();

    let first = Interpreter::new(profile(counted(&fetches), counted(&lookups)), memo.clone());
    let forked: Arc<Mutex<Option<History<Profile>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&forked);
    first.subscribe(move |signal| {
        if let Signal::Forked(history) = signal {
            *sink.lock().unwrap() = Some(history.clone());
        }
    });
    drive(&first).await.unwrap();
    assert_eq!(first.view().text, "Roy details / ok");

    first.view().rename.unwrap().set("Matan");
    let history = forked.lock().unwrap().take().unwrap();
    assert_eq!(history.len(), 2);

    let second = Interpreter::new(profile(counted(&fetches), counted(&lookups)), memo.clone());
    second.replay(history).unwrap();
    assert_eq!(second.position(), 2);
    drive(&second).await.unwrap();

    assert_eq!(second.view().text, "Matan details / ok");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn replay_of_any_prefix_reproduces_the_trace() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let lookups = Arc::new(AtomicUsize::new(0));
    let memo = Memo::new();

    let reference = Interpreter::new(profile(counted(&fetches), counted(&lookups)), memo.clone());
    drive(&reference).await.unwrap();
    let full = reference.history();
    let timeline = reference.timeline();

    for cut in 1..=full.len() {
        let prefix: History<Profile> = full.entries()[..cut].to_vec().into();
        let replayed =
            Interpreter::new(profile(counted(&fetches), counted(&lookups)), memo.clone());
        replayed.replay(prefix).unwrap();
        drive(&replayed).await.unwrap();
        assert_eq!(replayed.timeline(), timeline, "diverged after replaying {cut} steps");
        assert_eq!(replayed.view().text, reference.view().text);
    }
}

fn cached_fetch(calls: Arc<AtomicUsize>, cache: bool) -> StepSequence<String> {
    StepSequence::new()
        .step("fetch", move |_, _| {
            let calls = Arc::clone(&calls);
            let producer = move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ProducerError>("ok") }
            };
            let effect = if cache {
                await_for_cached(producer, vec![])
            } else {
                await_for(producer)
            };
            Ok(effect.into())
        })
        .step("view", |_, input| {
            let result = input.value()?;
            Ok(Yielded::Complete(format!(
                "promise result: {}",
                result.as_str().unwrap_or_default()
            )))
        })
}

#[tokio::test]
async fn cached_await_runs_once_across_restarts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let memo = Memo::new();
    for _ in 0..2 {
        let instance = Interpreter::new(cached_fetch(counted(&calls), true), memo.clone());
        drive(&instance).await.unwrap();
        assert_eq!(instance.view(), "promise result: ok");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn uncached_await_runs_on_every_restart() {
    let calls = Arc::new(AtomicUsize::new(0));
    let memo = Memo::new();
    for _ in 0..2 {
        let instance = Interpreter::new(cached_fetch(counted(&calls), false), memo.clone());
        drive(&instance).await.unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(memo.is_empty());
}

#[tokio::test]
async fn terminated_instance_ignores_late_results() {
    let (tx, rx) = oneshot::channel::<&'static str>();
    let mut pending = Some(rx);
    let procedure = procedure_fn(move |_input: Option<Resumption>| {
        let Some(rx) = pending.take() else {
            return Ok(Yielded::Complete(String::from("done")));
        };
        Ok(await_for(move || async move { rx.await }).into())
    });
    let instance = Interpreter::new(procedure, Memo::new());
    let (signals, mut received) = mpsc::unbounded_channel();
    instance.subscribe(move |signal| {
        let _ = signals.send(signal.name());
    });

    instance.proceed().unwrap();
    assert_eq!(instance.status(), Status::Running);
    instance.terminate();
    tx.send("late").unwrap();
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    assert!(instance.history().is_empty());
    assert!(instance.is_terminated());
    assert!(received.try_recv().is_err());
}

#[tokio::test]
async fn producer_failure_is_signalled_and_terminates() {
    let sequence: StepSequence<String> = StepSequence::new()
        .step("loading", |_, _| Ok(render("loading...".to_string()).into()))
        .step("fetch", |_, _| {
            Ok(await_for(|| async {
                Err::<Value, _>(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
            })
            .into())
        })
        .step("view", |_, _| Ok(Yielded::Complete("unreachable".to_string())));
    let instance = Interpreter::new(sequence, Memo::new());
    let (errors, mut rejected) = mpsc::unbounded_channel();
    instance.subscribe(move |signal| {
        if let Signal::Rejected(error) = signal {
            let _ = errors.send(error.clone());
        }
    });

    instance.proceed().unwrap();
    let error = rejected.recv().await.unwrap();
    assert!(matches!(
        &error,
        SagaError::Producer { position: 1, message } if message == "boom"
    ));
    assert!(instance.is_terminated());
    assert_eq!(instance.position(), 1);
    assert_eq!(instance.view(), "loading...");
}

#[tokio::test]
async fn panicking_producer_is_rejected() {
    let procedure = procedure_fn(|_input: Option<Resumption>| {
        Ok(await_for(|| async {
            let connected = false;
            if !connected {
                panic!("lost connection");
            }
            Ok::<_, ProducerError>("unreachable")
        })
        .into())
    });
    let instance: Interpreter<String> = Interpreter::new(procedure, Memo::new());
    let (errors, mut rejected) = mpsc::unbounded_channel();
    instance.subscribe(move |signal| {
        if let Signal::Rejected(error) = signal {
            let _ = errors.send(error.clone());
        }
    });

    instance.proceed().unwrap();
    let error = rejected.recv().await.unwrap();
    assert!(matches!(
        &error,
        SagaError::Producer { position: 0, message }
            if message.contains("producer panicked") && message.contains("lost connection")
    ));
    assert!(instance.is_terminated());
    assert!(instance.history().is_empty());
}
