use arbor::ArborError;
use arbor::grid::Grid;
use arbor::tree::{NodeId, NodeKind, Tree};

fn assert_links_agree(tree: &Tree, nodes: &[NodeId]) {
    for &node in nodes {
        if let Some(parent) = tree.parent(node).unwrap() {
            assert!(
                tree.children(parent).unwrap().contains(&node),
                "{node} points at {parent} but is not listed there"
            );
        }
        let children = tree.children(node).unwrap();
        for &child in &children {
            assert_eq!(tree.parent(child).unwrap(), Some(node), "{node} lists {child}");
            assert_eq!(children.iter().filter(|&&c| c == child).count(), 1);
        }
    }
}

#[test]
fn parented_construction_links_both_sides() {
    let tree = Tree::new();
    let root = tree.create_root("").unwrap();
    let a = tree.create_node("A", Some(root)).unwrap();
    let b = tree.create_node("B", Some(a)).unwrap();
    assert_eq!(tree.parent(b).unwrap(), Some(a));
    assert_eq!(tree.children(root).unwrap(), vec![a]);
    assert_eq!(tree.children(a).unwrap(), vec![b]);
    assert_eq!(tree.parent(root).unwrap(), None);
    assert!(tree.is_leaf(b).unwrap());
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.roots().unwrap(), vec![root]);
    assert_links_agree(&tree, &[root, a, b]);
}

#[test]
fn links_stay_consistent_under_any_edit_sequence() {
    let tree = Tree::new();
    let nodes: Vec<NodeId> = (0..8)
        .map(|i| tree.create_root(format!("n{i}")).unwrap())
        .collect();
    // a small linear congruential generator keeps the sequence reproducible
    let mut seed: u64 = 0x5eed;
    let mut next = |bound: usize| {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((seed >> 33) as usize) % bound
    };
    for _ in 0..500 {
        let a = nodes[next(nodes.len())];
        let b = nodes[next(nodes.len())];
        let outcome = match next(4) {
            0 => tree.add_child(a, b),
            1 => tree.remove_child(a, b),
            2 => tree.set_parent(a, Some(b)),
            _ => tree.set_parent(a, None),
        };
        match outcome {
            Ok(()) | Err(ArborError::StructuralIntegrity(_)) => (),
            Err(e) => panic!("unexpected error {e}"),
        }
        assert_links_agree(&tree, &nodes);
    }
}

#[test]
fn cycles_are_refused() {
    let tree = Tree::new();
    let a = tree.create_root("A").unwrap();
    let b = tree.create_node("B", Some(a)).unwrap();
    let c = tree.create_node("C", Some(b)).unwrap();
    assert!(matches!(tree.set_parent(a, Some(a)), Err(ArborError::StructuralIntegrity(_))));
    assert!(matches!(tree.add_child(c, a), Err(ArborError::StructuralIntegrity(_))));
    assert_eq!(tree.parent(a).unwrap(), None);
    assert_links_agree(&tree, &[a, b, c]);
}

#[test]
fn reparenting_moves_between_lists() {
    let tree = Tree::new();
    let left = tree.create_root("left").unwrap();
    let right = tree.create_root("right").unwrap();
    let child = tree.create_node("child", Some(left)).unwrap();
    tree.set_parent(child, Some(right)).unwrap();
    assert!(tree.children(left).unwrap().is_empty());
    assert_eq!(tree.children(right).unwrap(), vec![child]);
    tree.add_child(right, child).unwrap();
    assert_eq!(tree.children(right).unwrap(), vec![child]);
    tree.set_parent(child, None).unwrap();
    assert!(tree.children(right).unwrap().is_empty());
    assert_eq!(tree.parent(child).unwrap(), None);
}

#[test]
fn removing_a_foreign_child_changes_nothing() {
    let tree = Tree::new();
    let owner = tree.create_root("owner").unwrap();
    let stranger = tree.create_root("stranger").unwrap();
    let child = tree.create_node("child", Some(owner)).unwrap();
    tree.remove_child(stranger, child).unwrap();
    assert_eq!(tree.parent(child).unwrap(), Some(owner));
    assert_eq!(tree.children(owner).unwrap(), vec![child]);
    tree.remove_child(owner, child).unwrap();
    assert_eq!(tree.parent(child).unwrap(), None);
    tree.remove_child(owner, child).unwrap();
}

#[test]
fn find_child_prefers_the_last_duplicate() {
    let tree = Tree::new();
    let root = tree.create_root("").unwrap();
    let first = tree.create_node("dup", Some(root)).unwrap();
    let second = tree.create_node("dup", Some(root)).unwrap();
    tree.create_node("other", Some(root)).unwrap();
    assert_ne!(first, second);
    assert_eq!(tree.find_child(root, "dup").unwrap(), Some(second));
    assert_eq!(tree.find_child(root, "missing").unwrap(), None);

    // grids resolve duplicate labels the other way round
    let mut grid = Grid::new(2, 1).unwrap();
    grid.set_labels(["dup", "dup"]).unwrap();
    assert_eq!(grid.find_label("dup"), Some(0));
}

#[test]
fn index_nodes_reference_without_owning() {
    let tree = Tree::new();
    let data = tree.create_root("data").unwrap();
    let target = tree.create_node("IBM", Some(data)).unwrap();
    let index = tree.create_root("by-ticker").unwrap();
    let entry = tree.create_index_node("IBM", Some(index), Some(target)).unwrap();
    assert_eq!(tree.kind(entry).unwrap(), NodeKind::Index);
    assert_eq!(tree.reference(entry).unwrap(), Some(target));
    assert_eq!(tree.parent(target).unwrap(), Some(data));

    assert!(matches!(
        tree.set_reference(data, Some(target)),
        Err(ArborError::InvalidArgument(_))
    ));
    assert_eq!(tree.reference(data).unwrap(), None);

    tree.deep_destroy(target).unwrap();
    assert_eq!(tree.reference(entry).unwrap(), None);
    assert!(tree.contains(entry));
    assert!(matches!(
        tree.set_reference(entry, Some(target)),
        Err(ArborError::NotFound(_))
    ));
    tree.set_reference(entry, Some(data)).unwrap();
    assert_eq!(tree.reference(entry).unwrap(), Some(data));
}

#[test]
fn stale_handles_are_not_found() {
    let tree = Tree::new();
    let root = tree.create_root("root").unwrap();
    tree.deep_destroy(root).unwrap();
    assert!(matches!(tree.name(root), Err(ArborError::NotFound(_))));
    assert!(matches!(tree.put_var(root, "x", 1.0), Err(ArborError::NotFound(_))));
    assert!(matches!(tree.create_node("orphan", Some(root)), Err(ArborError::NotFound(_))));
    assert!(tree.is_empty());
    // handles are never handed out twice
    let fresh = tree.create_root("root").unwrap();
    assert_ne!(fresh, root);
}

#[test]
fn unique_leaf_names_are_collected_in_order() {
    let tree = Tree::new();
    let root = tree.create_root("").unwrap();
    let a = tree.create_node("A", Some(root)).unwrap();
    let b = tree.create_node("B", Some(root)).unwrap();
    tree.create_node("w", Some(root)).unwrap();
    tree.create_node("x", Some(a)).unwrap();
    tree.create_node("y", Some(a)).unwrap();
    tree.create_node("x", Some(b)).unwrap();
    let z_parent = tree.create_node("deeper", Some(b)).unwrap();
    tree.create_node("z", Some(z_parent)).unwrap();
    assert_eq!(tree.unique_leaf_node_names(root).unwrap(), vec!["x", "y", "z", "w"]);
    assert!(tree.unique_leaf_node_names(z_parent).unwrap() == vec!["z"]);
    let leaf = tree.find_child(a, "x").unwrap().unwrap();
    assert!(tree.unique_leaf_node_names(leaf).unwrap().is_empty());
}

#[test]
fn steps_skip_an_empty_root_name() {
    let tree = Tree::new();
    let root = tree.create_root("").unwrap();
    let a = tree.create_node("A", Some(root)).unwrap();
    let quoted = tree.create_node("a/b", Some(a)).unwrap();
    assert_eq!(tree.steps(quoted).unwrap(), vec!["A", "a/b"]);
    assert_eq!(tree.path_of(quoted).unwrap(), "A/\"a/b\"");
    assert!(tree.steps(root).unwrap().is_empty());
    assert_eq!(tree.root_of(quoted).unwrap(), root);

    let named = tree.create_root("R").unwrap();
    let child = tree.create_node("c", Some(named)).unwrap();
    assert_eq!(tree.steps(child).unwrap(), vec!["R", "c"]);
    tree.rename(named, "S").unwrap();
    assert_eq!(tree.path_of(child).unwrap(), "S/c");
}
