use std::collections::BTreeSet;

use proptest::prelude::*;
use strandyard::tasks::parser::parse;
use strandyard::tasks::{load_tasks, CircularParent, Metadata, SelfReference, Task, TaskMap, TaskStore, TodoItem};
use strandyard::testing::MockRoleCatalog;
use tempfile::TempDir;

const IDS: [&str; 5] = ["T1aaaa-one", "T2bbbb-two", "T3cccc-three", "T4dddd-four", "T5eeee-five"];

fn words(max: usize) -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,8}", 1..=max).prop_map(|words| words.join(" "))
}

fn arb_meta() -> impl Strategy<Value = Metadata> {
    (
        prop::sample::select(vec!["", "developer", "reviewer"]),
        prop::sample::select(vec!["", "high", "medium", "low"]),
        prop::sample::select(vec!["", "open", "in_progress", "done", "cancelled", "duplicate"]),
        any::<bool>(),
        prop::option::of(prop::sample::select(IDS.to_vec())),
        prop::sample::subsequence(IDS.to_vec(), 0..3),
        prop::sample::subsequence(IDS.to_vec(), 0..3),
    )
        .prop_map(|(role, priority, status, completed, parent, blockers, blocks)| Metadata {
            role: role.to_string(),
            priority: priority.to_string(),
            status: status.to_string(),
            completed,
            parent: parent.unwrap_or_default().to_string(),
            blockers: blockers.into_iter().map(String::from).collect(),
            blocks: blocks.into_iter().map(String::from).collect(),
            ..Metadata::default()
        })
}

fn arb_todo() -> impl Strategy<Value = TodoItem> {
    (any::<bool>(), prop::option::of("[a-z]{1,8}"), words(5), prop::option::of(words(4))).prop_map(
        |(checked, role, text, report)| {
            let mut item = TodoItem { checked, role, text, report, ..TodoItem::default() };
            item.raw = item.head_line();
            item
        },
    )
}

fn arb_subtask() -> impl Strategy<Value = TodoItem> {
    (any::<bool>(), prop::sample::select(IDS.to_vec()), "[A-Z][a-z]{0,8}").prop_map(|(checked, id, text)| {
        let mut item = TodoItem { checked, subtask_id: Some(id.to_string()), text, ..TodoItem::default() };
        item.raw = item.head_line();
        item
    })
}

prop_compose! {
    fn arb_task()(
        meta in arb_meta(),
        title in prop::option::of("[A-Z][a-z]{0,8}( [a-z]{1,8}){0,3}"),
        body in prop::collection::vec(words(6), 0..3),
        todos in prop::collection::vec(arb_todo(), 0..4),
        subtasks in prop::collection::vec(arb_subtask(), 0..3),
        progress in prop::option::of(words(6)),
        notes in prop::option::of(words(6)),
    ) -> Task {
        let mut task = Task { id: "T9zzzz-subject".to_string(), meta, ..Task::default() };
        task.title = title.unwrap_or_default();
        task.body = body.join("\n\n");
        task.todo_items = todos;
        task.subtask_items = subtasks;
        task.progress = progress.unwrap_or_default();
        // Trailing sections only exist after a list or progress section.
        let has_special = !task.todo_items.is_empty() || !task.subtask_items.is_empty() || !task.progress.is_empty();
        if has_special {
            task.other = notes.map(|text| format!("## Notes\n{text}")).unwrap_or_default();
        }
        for (i, item) in task.todo_items.iter_mut().enumerate() {
            item.index = i + 1;
        }
        for (i, item) in task.subtask_items.iter_mut().enumerate() {
            item.index = i + 1;
        }
        task
    }
}

/// A task document with its sections in any order, the title included.
fn arb_document() -> impl Strategy<Value = String> {
    (
        "[A-Z][a-z]{0,8}",
        prop::option::of(words(5)),
        prop::collection::vec(words(4), 1..3),
        prop::option::of(words(5)),
        prop::option::of(words(5)),
    )
        .prop_flat_map(|(title, prose, todos, progress, notes)| {
            let mut sections = vec![match prose {
                Some(prose) => format!("# {title}\n{prose}"),
                None => format!("# {title}"),
            }];
            let items: Vec<String> = todos.iter().map(|text| format!("- [ ] {text}")).collect();
            sections.push(format!("## TODOs\n{}", items.join("\n")));
            sections.extend(progress.map(|text| format!("## Progress\n{text}")));
            sections.extend(notes.map(|text| format!("## Notes\n{text}")));
            Just(sections).prop_shuffle()
        })
        .prop_map(|sections| format!("---\nrole: developer\n---\n{}\n", sections.join("\n")))
}

#[derive(Debug, Clone)]
enum Op {
    AddBlocker(usize, usize),
    RemoveBlocker(usize, usize),
    Finish(usize),
    Fix,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..IDS.len(), 0..IDS.len()).prop_map(|(a, b)| Op::AddBlocker(a, b)),
        2 => (0..IDS.len(), 0..IDS.len()).prop_map(|(a, b)| Op::RemoveBlocker(a, b)),
        1 => (0..IDS.len()).prop_map(Op::Finish),
        1 => Just(Op::Fix),
    ]
}

fn new_store(dir: &TempDir) -> TaskStore {
    let mut store = TaskStore::new(dir.path().join("tasks"), Box::new(MockRoleCatalog::with_roles(&["developer"])));
    for id in IDS {
        store.get_or_create(id).unwrap();
    }
    store
}

fn assert_symmetric(tasks: &TaskMap) -> Result<(), TestCaseError> {
    for task in tasks.values() {
        let blockers: BTreeSet<&String> = task.meta.blockers.iter().collect();
        prop_assert_eq!(blockers.len(), task.meta.blockers.len(), "duplicate blockers on {}", task.id);
        for blocker in &task.meta.blockers {
            if let Some(other) = tasks.get(blocker) {
                prop_assert!(other.meta.blocks.contains(&task.id), "{} missing from blocks of {}", task.id, blocker);
            }
        }
        for blocked in &task.meta.blocks {
            let other = &tasks[blocked];
            prop_assert!(other.meta.blockers.contains(&task.id), "{} missing from blockers of {}", task.id, blocked);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn parse_render_parse_is_lossless(task in arb_task()) {
        let content = task.content().unwrap();
        let parsed = parse(&content, &task.id).unwrap();
        prop_assert_eq!(&parsed, &task);
        prop_assert_eq!(parsed.content().unwrap(), content);
    }

    #[test]
    fn rendering_is_stable_for_any_section_order(document in arb_document()) {
        let first = parse(&document, "T9zzzz-subject").unwrap();
        let rendered = first.content().unwrap();
        let second = parse(&rendered, "T9zzzz-subject").unwrap();
        prop_assert!(second.stray_item_lines.is_empty(), "stray lines in {:?}", rendered);
        prop_assert_eq!(&second, &first);
        prop_assert_eq!(second.content().unwrap(), rendered);
    }

    #[test]
    fn blocker_edges_stay_symmetric(ops in prop::collection::vec(arb_op(), 1..30)) {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);

        for op in ops {
            match op {
                Op::AddBlocker(a, b) if a != b => store.add_blocker(IDS[a], IDS[b]).unwrap(),
                Op::AddBlocker(a, b) => prop_assert!(store.add_blocker(IDS[a], IDS[b]).is_err()),
                Op::RemoveBlocker(a, b) => store.remove_blocker(IDS[a], IDS[b]).unwrap(),
                Op::Finish(a) => store.set_status_with_report(IDS[a], "done", "").unwrap(),
                Op::Fix => {
                    store.fix_blocker_relationships();
                }
            }
            assert_symmetric(store.get_all())?;
        }
    }

    #[test]
    fn parent_links_stay_acyclic(links in prop::collection::vec((0..IDS.len(), 0..IDS.len()), 1..20)) {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);

        for (child, parent) in links {
            let before = store.get_all().clone();
            if store.set_parent(IDS[child], IDS[parent]).is_err() {
                prop_assert_eq!(store.get_all(), &before);
            }
            for id in IDS {
                let mut seen = BTreeSet::from([id.to_string()]);
                let mut current = store.get_all()[id].meta.parent.clone();
                while !current.is_empty() {
                    prop_assert!(seen.insert(current.clone()), "cycle through {}", id);
                    current = store.get_all()[&current].meta.parent.clone();
                }
            }
        }
    }

    #[test]
    fn parent_links_stay_acyclic_when_loaded_lazily(links in prop::collection::vec((0..IDS.len(), 0..IDS.len()), 1..12)) {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);
        store.save_all().unwrap();

        for (child, parent) in links {
            let mut lazy = TaskStore::new(dir.path().join("tasks"), Box::new(MockRoleCatalog::with_roles(&["developer"])));
            if let Err(err) = lazy.set_parent(IDS[child], IDS[parent]) {
                prop_assert!(
                    err.task_error::<CircularParent>().is_some() || err.task_error::<SelfReference>().is_some(),
                    "unexpected error: {}",
                    err
                );
            }
            lazy.save_dirty().unwrap();

            let tasks = load_tasks(&dir.path().join("tasks")).unwrap();
            for id in IDS {
                let mut seen = BTreeSet::from([id.to_string()]);
                let mut current = tasks[id].meta.parent.clone();
                while !current.is_empty() {
                    prop_assert!(seen.insert(current.clone()), "cycle through {}", id);
                    current = tasks[&current].meta.parent.clone();
                }
            }
        }
    }
}
