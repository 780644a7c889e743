use std::sync::Arc;
use std::thread;

use arbor::datatype::Value;
use arbor::tree::Tree;

const THREADS: usize = 8;

#[test]
fn threads_write_their_own_paths() {
    let tree = Arc::new(Tree::new());
    let root = tree.create_root("").unwrap();
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for n in 0..50 {
                    let path = format!("worker{i}/batch{}/n{n}", n % 5);
                    tree.put_var_at_path(root, &path, n as f64).unwrap();
                    assert_eq!(
                        tree.get_var_at_path(root, &path).unwrap(),
                        Some(Value::from(n as f64))
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    // root, one node per worker, five batches per worker
    assert_eq!(tree.len(), 1 + THREADS * 6);
    for i in 0..THREADS {
        let path = format!("/worker{i}/batch4/n49");
        assert_eq!(tree.get_var_at_path(root, &path).unwrap(), Some(Value::from(49.0)));
    }
}

#[test]
fn shared_node_accepts_concurrent_writes() {
    let tree = Arc::new(Tree::new());
    let node = tree.create_root("shared").unwrap();
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for n in 0..100 {
                    tree.put_var(node, format!("k{i}_{n}"), n as f64).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(tree.var_names(node).unwrap().len(), THREADS * 100);
}

#[test]
fn opposite_assignments_do_not_deadlock() {
    let tree = Arc::new(Tree::new());
    let a = tree.create_root("a").unwrap();
    let b = tree.create_root("b").unwrap();
    tree.put_var(a, "from", "a").unwrap();
    tree.put_var(b, "from", "b").unwrap();
    let pairs = [(a, b), (b, a)];
    let handles: Vec<_> = pairs
        .into_iter()
        .map(|(target, source)| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    tree.assign_vars(target, source).unwrap();
                    tree.merge_vars(source, target).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    // whichever assignment ran last, both maps hold the same value now
    let left = tree.get_var(a, "from").unwrap().unwrap();
    let right = tree.get_var(b, "from").unwrap().unwrap();
    assert!(left == Value::from("a") || left == Value::from("b"));
    assert!(right == Value::from("a") || right == Value::from("b"));
}

#[test]
fn concurrent_reparenting_keeps_links_consistent() {
    let tree = Arc::new(Tree::new());
    let parents: Vec<_> = (0..4)
        .map(|i| tree.create_root(format!("p{i}")).unwrap())
        .collect();
    let leaves: Vec<_> = (0..16)
        .map(|i| tree.create_node(format!("leaf{i}"), Some(parents[0])).unwrap())
        .collect();
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let tree = Arc::clone(&tree);
            let parents = parents.clone();
            let leaves = leaves.clone();
            thread::spawn(move || {
                for n in 0..200 {
                    let leaf = leaves[(i * 7 + n) % leaves.len()];
                    let parent = parents[(i + n) % parents.len()];
                    tree.set_parent(leaf, Some(parent)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let mut listed = 0;
    for &parent in &parents {
        for child in tree.children(parent).unwrap() {
            assert_eq!(tree.parent(child).unwrap(), Some(parent));
            listed += 1;
        }
    }
    assert_eq!(listed, leaves.len());
    for &leaf in &leaves {
        let parent = tree.parent(leaf).unwrap().unwrap();
        assert!(tree.children(parent).unwrap().contains(&leaf));
    }
}
