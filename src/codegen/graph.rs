use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ID(usize);

impl ID {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for ID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Node<T> {
    id: ID,
    val: T,
    // Edge order is insertion order, so fallthrough comes before a branch target.
    succ: Vec<ID>,
    pred: Vec<ID>,
}

impl<T> Node<T> {
    fn new(val: T, id: ID) -> Self {
        Node {
            id,
            val,
            succ: Vec::new(),
            pred: Vec::new(),
        }
    }

    pub fn id(&self) -> ID {
        self.id
    }

    pub fn val(&self) -> &T {
        &self.val
    }

    pub fn val_mut(&mut self) -> &mut T {
        &mut self.val
    }

    pub fn succ(&self) -> impl Iterator<Item = ID> + '_ {
        self.succ.iter().copied()
    }

    pub fn pred(&self) -> impl Iterator<Item = ID> + '_ {
        self.pred.iter().copied()
    }
}

impl<T> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Node<T> {}

#[derive(Debug, Clone)]
pub struct Graph<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Graph<T> {
    pub fn new() -> Self {
        Graph { nodes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Graph {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn get(&self, id: ID) -> &Node<T> {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: ID) -> &mut Node<T> {
        &mut self.nodes[id.0]
    }

    pub fn insert(&mut self, val: T) -> ID {
        let id = self.nodes.len();
        self.nodes.push(Node::new(val, ID(id)));
        ID(id)
    }

    /// Adds the edge `from -> to`. Returns false if it already existed.
    pub fn link(&mut self, from: ID, to: ID) -> bool {
        if self.nodes[from.0].succ.contains(&to) {
            return false;
        }
        self.nodes[from.0].succ.push(to);
        self.nodes[to.0].pred.push(from);
        true
    }

    pub fn succ(&self, id: ID) -> impl Iterator<Item = ID> + '_ {
        self.get(id).succ()
    }

    pub fn pred(&self, id: ID) -> impl Iterator<Item = ID> + '_ {
        self.get(id).pred()
    }

    pub fn nodes(&self) -> &[Node<T>] {
        &self.nodes
    }

    pub fn ids(&self) -> impl DoubleEndedIterator<Item = ID> {
        (0..self.nodes.len()).map(ID)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<T> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}
