/*
Rendering lives in a trait so the forest type stays free of display concerns;
termtree does the drawing.
 */
use generational_arena::Index;
use termtree::Tree;
use tracing::instrument;

use crate::domain::arena::{PrefixForest, PrefixNode};

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

fn label(node: &PrefixNode) -> String {
    if node.dead {
        format!("{} (dead)", node.prefix)
    } else {
        node.prefix.to_string()
    }
}

impl TreeNodeConvert for PrefixForest {
    #[instrument(level = "debug", skip(self))]
    fn to_tree_string(&self) -> Tree<String> {
        fn build_tree(forest: &PrefixForest, node_idx: Index) -> Option<Tree<String>> {
            let node = forest.get_node(node_idx)?;
            let leaves: Vec<_> = node
                .children
                .iter()
                .filter_map(|&child| build_tree(forest, child))
                .collect();
            Some(Tree::new(label(node)).with_leaves(leaves))
        }

        let roots: Vec<_> = self
            .roots()
            .iter()
            .filter_map(|&root| build_tree(self, root))
            .collect();
        Tree::new(format!("{} forest", self.family())).with_leaves(roots)
    }
}
