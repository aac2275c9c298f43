//! Integration Tests for the Engine
//!
//! These tests drive the public facade end to end: descriptions built with
//! `h`, mounted on the in-memory host, updated through signals, the
//! scheduler, and re-renders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_core::{h, Component, Dep, Engine, EngineConfig, Host, HostNode, InstanceId, MemoryHost, Node, Props, Scope};

fn engine() -> (Engine, Arc<MemoryHost>, HostNode) {
    let engine = Engine::new();
    let memory = engine.memory_host().expect("in-memory engine").clone();
    let root = memory.create_element("main");
    (engine, memory, root)
}

fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
    let count = Arc::new(AtomicI32::new(0));
    (count.clone(), count)
}

/// Changing only a text child patches the text node in place.
#[test]
fn text_update_reuses_the_element() {
    let (engine, memory, root) = engine();
    let cx = engine.scope();
    let id = engine.render(h(&cx, "div", Props::new().attr("id", "x"), "hello"), root);
    let div = memory.children(root)[0];
    memory.reset_stats();

    engine.update(id, h(&cx, "div", Props::new().attr("id", "x"), "world")).unwrap();
    assert_eq!(memory.children(root)[0], div);
    assert_eq!(memory.to_html(root), "<main><div id=\"x\">world</div></main>");
    assert_eq!(memory.stats().creates(), 0);
}

/// A derived signal recomputes once per batch and an effect watching it
/// re-runs exactly once.
#[test]
fn derived_signal_and_effect_follow_their_sources() {
    let (engine, memory, root) = engine();
    let a = engine.signal(1);
    let b = engine.signal(2);
    let (computes, computes_clone) = counter();
    let (effect_runs, effect_runs_clone) = counter();
    let observed = Arc::new(Mutex::new(Vec::new()));

    let (ra, rb) = (a.clone(), b.clone());
    let sum = engine.derive(move || {
        computes_clone.fetch_add(1, Ordering::SeqCst);
        ra.get() + rb.get()
    });
    assert_eq!(sum.get_untracked(), 3);

    let view_sum = sum.clone();
    let log = observed.clone();
    engine.mount(root, move |cx: &Scope| {
        let read = view_sum.clone();
        let log = log.clone();
        let runs = effect_runs_clone.clone();
        let dep = view_sum.clone();
        cx.effect_with(
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                log.lock().push(read.get_untracked());
                None
            },
            move || vec![Dep::from(&dep)],
        );
        h(cx, "output", Props::new(), &view_sum)
    });
    assert_eq!(memory.text_content(root), "3");
    assert_eq!(effect_runs.load(Ordering::SeqCst), 1);

    a.set(3);
    b.set(4);
    assert_eq!(sum.get_untracked(), 3);
    engine.run_until_idle().unwrap();

    assert_eq!(sum.get_untracked(), 7);
    assert_eq!(memory.text_content(root), "7");
    assert_eq!(computes.load(Ordering::SeqCst), 2);
    assert_eq!(effect_runs.load(Ordering::SeqCst), 2);
    assert_eq!(*observed.lock(), vec![3, 7]);
}

/// Writes to many signals inside one tick reach a shared subscriber once.
#[test]
fn writes_in_one_tick_are_batched() {
    let (engine, _memory, _root) = engine();
    let signals: Vec<_> = (0..8).map(|i| engine.signal(i)).collect();
    let (computes, computes_clone) = counter();
    let sources = signals.clone();
    let total = engine.derive(move || {
        computes_clone.fetch_add(1, Ordering::SeqCst);
        sources.iter().map(|s| s.get()).sum::<i32>()
    });
    assert_eq!(total.get_untracked(), 28);

    for signal in &signals {
        signal.update(|v| v + 1);
    }
    assert_eq!(engine.runtime().scheduler().pending_len(), 1);

    let stats = engine.flush();
    assert_eq!(stats.executed, 1);
    assert_eq!(computes.load(Ordering::SeqCst), 2);
    assert_eq!(total.get_untracked(), 36);
}

/// Swapping keyed siblings moves one host node and creates nothing.
#[test]
fn keyed_swap_moves_host_nodes() {
    let (engine, memory, root) = engine();
    let cx = engine.scope();
    let list = |keys: &[&str]| {
        let items: Vec<Node> = keys.iter().map(|k| h(&cx, "li", Props::new().key(*k), *k)).collect();
        h(&cx, "ul", Props::new(), items)
    };
    let id = engine.render(list(&["a", "b"]), root);
    let ul = memory.children(root)[0];
    let before = memory.children(ul);
    memory.reset_stats();

    engine.update(id, list(&["b", "a"])).unwrap();
    assert_eq!(memory.children(ul), vec![before[1], before[0]]);
    let stats = memory.stats();
    assert_eq!((stats.creates(), stats.removes, stats.moves), (0, 0, 1));
}

/// Tasks queued for an instance never run once it is unmounted, and its
/// effect cleanup runs during the unmount.
#[test]
fn unmounted_instances_receive_no_callbacks() {
    let (engine, memory, root) = engine();
    let count = engine.signal(0);
    let (runs, runs_clone) = counter();
    let (cleanups, cleanups_clone) = counter();

    let watched = count.clone();
    let id = engine.mount(root, move |cx: &Scope| {
        let runs = runs_clone.clone();
        let cleanups = cleanups_clone.clone();
        let dep = watched.clone();
        cx.effect_with(
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                let cleanups = cleanups.clone();
                Some(Box::new(move || {
                    cleanups.fetch_add(1, Ordering::SeqCst);
                }))
            },
            move || vec![Dep::from(&dep)],
        );
        h(cx, "p", Props::new(), &watched)
    });

    count.set(1);
    assert!(engine.runtime().scheduler().has_pending());
    engine.unmount(id).unwrap();
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(engine.runtime().scheduler().pending_len(), 0);

    engine.run_until_idle().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(count.subscriber_count(), 0);
    assert_eq!(memory.to_html(root), "<main></main>");
    assert!(engine.instance(id).is_none());
}

/// Re-rendering an unchanged view touches nothing in the host.
#[test]
fn refreshing_an_unchanged_view_is_a_no_op() {
    let (engine, memory, root) = engine();
    let id = engine.mount(root, |cx: &Scope| {
        h(
            cx,
            "section",
            Props::new().attr("class", "card").style("color", "red"),
            vec![
                h(cx, "h1", Props::new(), "title"),
                h(cx, "p", Props::new().key("body"), "body"),
            ],
        )
    });
    memory.reset_stats();

    engine.refresh(id).unwrap();
    engine.refresh(id).unwrap();
    assert_eq!(memory.stats().total(), 0);
}

/// Keyed component instances keep their identity when rows move, and only
/// rows that disappear are torn down.
#[test]
fn keyed_component_instances_survive_reordering() {
    let (engine, memory, root) = engine();
    let rows = engine.signal(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    let ids: Arc<Mutex<HashMap<String, InstanceId>>> = Arc::default();
    let dropped: Arc<Mutex<Vec<String>>> = Arc::default();

    let (ids_clone, dropped_clone) = (ids.clone(), dropped.clone());
    let row = Component::new("Row", move |cx, props, _children| {
        let key = props.get_key().map(|k| k.to_string()).unwrap_or_default();
        if let Some(id) = cx.instance() {
            ids_clone.lock().insert(key.clone(), id);
        }
        let dropped = dropped_clone.clone();
        let name = key.clone();
        cx.effect(move || {
            let dropped = dropped.clone();
            let name = name.clone();
            Some(Box::new(move || dropped.lock().push(name)))
        });
        h(cx, "li", Props::new(), key)
    });

    let read = rows.clone();
    let id = engine.mount(root, move |cx: &Scope| {
        let items: Vec<Node> = read
            .get_untracked()
            .into_iter()
            .map(|key| h(cx, row.clone(), Props::new().key(key), ()))
            .collect();
        h(cx, "ul", Props::new(), items)
    });
    let first = ids.lock().clone();
    assert_eq!(engine.instance(id).unwrap().children.len(), 3);

    rows.set(vec!["c".to_string(), "a".to_string()]);
    engine.refresh(id).unwrap();
    assert_eq!(memory.to_html(root), "<main><ul><li>c</li><li>a</li></ul></main>");
    assert_eq!(ids.lock()["a"], first["a"]);
    assert_eq!(ids.lock()["c"], first["c"]);
    assert!(!engine.is_alive(first["b"]));
    assert_eq!(*dropped.lock(), vec!["b".to_string()]);

    rows.set(vec!["c".to_string(), "d".to_string(), "a".to_string()]);
    engine.refresh(id).unwrap();
    assert_eq!(memory.to_html(root), "<main><ul><li>c</li><li>d</li><li>a</li></ul></main>");
    assert_eq!(ids.lock()["a"], first["a"]);
    assert!(engine.is_alive(ids.lock()["d"]));
    assert_eq!(engine.instance(id).unwrap().children.len(), 3);
}

/// Lifecycle callbacks fire in order: `will*` inline, `did*` on the next
/// flush.
#[test]
fn lifecycle_phases_run_in_order() {
    let (engine, _memory, root) = engine();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
    let sink = log.clone();
    let id = engine.mount(root, move |cx: &Scope| {
        for (phase, name) in [
            (0, "willMount"),
            (1, "didMount"),
            (2, "willUpdate"),
            (3, "didUpdate"),
            (4, "willUnmount"),
            (5, "didUnmount"),
        ] {
            let sink = sink.clone();
            let record = move |_: Option<HostNode>| sink.lock().push(name);
            match phase {
                0 => cx.on_will_mount(record),
                1 => cx.on_did_mount(record),
                2 => cx.on_will_update(record),
                3 => cx.on_did_update(record),
                4 => cx.on_will_unmount(record),
                _ => cx.on_did_unmount(record),
            }
        }
        h(cx, "div", Props::new(), ())
    });
    assert_eq!(*log.lock(), vec!["willMount"]);
    engine.flush();
    assert_eq!(*log.lock(), vec!["willMount", "didMount"]);

    engine.refresh(id).unwrap();
    engine.flush();
    engine.unmount(id).unwrap();
    assert_eq!(log.lock().last(), Some(&"willUnmount"));
    engine.flush();
    assert_eq!(
        *log.lock(),
        vec!["willMount", "didMount", "willUpdate", "didUpdate", "willUnmount", "didUnmount"]
    );
}

/// A nested instance dropped by a refresh hears willUnmount while its host
/// tree is still attached, and didUnmount on the next flush.
#[test]
fn dropped_children_unmount_while_attached() {
    let (engine, memory, root) = engine();
    let log: Arc<Mutex<Vec<(&'static str, Option<HostNode>)>>> = Arc::default();

    let (sink, host) = (log.clone(), memory.clone());
    let child = Component::new("Child", move |cx, _props, _children| {
        let (will, did) = (sink.clone(), sink.clone());
        let host = host.clone();
        cx.on_will_unmount(move |dom: Option<HostNode>| {
            will.lock().push(("willUnmount", dom.and_then(|node| host.parent(node))));
        });
        cx.on_did_unmount(move |dom: Option<HostNode>| did.lock().push(("didUnmount", dom)));
        h(cx, "span", Props::new(), "child")
    });

    let show = engine.signal(true);
    let read = show.clone();
    let id = engine.mount(root, move |cx: &Scope| {
        if read.get_untracked() {
            h(cx, "div", Props::new(), h(cx, child.clone(), Props::new(), ()))
        } else {
            h(cx, "div", Props::new(), ())
        }
    });
    engine.run_until_idle().unwrap();
    let div = memory.children(root)[0];
    let span = memory.children(div)[0];
    let nested = engine.instance(id).unwrap().children[0];

    show.set(false);
    engine.refresh(id).unwrap();
    assert_eq!(*log.lock(), vec![("willUnmount", Some(div))]);
    assert!(!engine.is_alive(nested));
    assert!(memory.children(div).is_empty());

    engine.run_until_idle().unwrap();
    assert_eq!(*log.lock(), vec![("willUnmount", Some(div)), ("didUnmount", Some(span))]);
}

/// A component that renders bare text still gets a root and its mount
/// lifecycle.
#[test]
fn text_components_receive_mount_lifecycles() {
    let (engine, memory, root) = engine();
    let (mounts, mounts_clone) = counter();
    let (updates, updates_clone) = counter();
    let label = Component::new("Label", move |cx, _props, _children| {
        let mounts = mounts_clone.clone();
        let updates = updates_clone.clone();
        cx.on_did_mount(move |_| {
            mounts.fetch_add(1, Ordering::SeqCst);
        });
        cx.on_did_update(move |_| {
            updates.fetch_add(1, Ordering::SeqCst);
        });
        Node::text("hi")
    });

    let id = engine.mount(root, move |cx: &Scope| h(cx, "p", Props::new(), h(cx, label.clone(), Props::new(), ())));
    engine.run_until_idle().unwrap();
    assert_eq!(mounts.load(Ordering::SeqCst), 1);
    assert_eq!(memory.to_html(root), "<main><p>hi</p></main>");

    let nested = engine.instance(id).unwrap().children[0];
    let text = engine.instance(nested).unwrap().root.expect("text root");
    assert_eq!(memory.text(text).as_deref(), Some("hi"));

    engine.refresh(id).unwrap();
    engine.run_until_idle().unwrap();
    assert_eq!(mounts.load(Ordering::SeqCst), 1);
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(engine.instance(nested).unwrap().root, Some(text));
}

/// A panicking subscriber is contained; the rest of the batch still runs.
#[test]
fn panicking_tasks_are_contained() {
    let (engine, _memory, _root) = engine();
    let signal = engine.signal(0);
    let (runs, runs_clone) = counter();
    signal.subscribe(|| panic!("subscriber failed"));
    signal.subscribe(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    signal.set(1);
    let stats = engine.flush();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.executed, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    signal.set(2);
    assert_eq!(engine.flush().executed, 1);
}

#[test]
fn configuration_comes_from_json() {
    let config = EngineConfig::from_json(r#"{ "anonymous_label": "view" }"#).unwrap();
    assert_eq!(config.max_flush_rounds, 1024);
    let engine = Engine::with_config(config);
    let memory = engine.memory_host().unwrap().clone();
    let root = memory.create_element("main");

    let id = engine.render(Node::Text("loose".into()), root);
    assert_eq!(engine.instance(id).unwrap().label, "view");
}

#[tokio::test]
async fn driver_flushes_signal_writes() {
    let (engine, memory, root) = engine();
    let name = engine.signal("ada".to_string());
    let cx = engine.scope();
    engine.render(h(&cx, "span", Props::new(), &name), root);

    let driver = engine.clone();
    let handle = tokio::spawn(async move { driver.drive().await });

    name.set("grace".to_string());
    engine.settle().await.unwrap();
    for _ in 0..16 {
        if memory.text_content(root) == "grace" {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(memory.text_content(root), "grace");
    handle.abort();
}
