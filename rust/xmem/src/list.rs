//! MSVC x64 `std::list`.
//!
//! The list object holds a pointer to a sentinel node and the element count. Every
//! node starts with `next` and `prev` pointers, followed by the element payload;
//! the last node links back to the sentinel.

use xmem_common::{Result, error::Error};

use crate::{shape::Shape, view::View};

#[derive(Debug, Clone)]
pub struct StdList {
    view: View,
}

impl StdList {
    const SENTINEL: usize = 0;
    const LENGTH: usize = 8;
    const NODE_LINKS: usize = 16;

    /// Offset of the payload inside a node.
    pub const NODE_PAYLOAD: usize = 16;

    pub fn sentinel(&self) -> Result<u64> {
        self.view.read_pointer(Self::SENTINEL)
    }

    pub fn len(&self) -> Result<u64> {
        self.view.read(Self::LENGTH)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Addresses of the element nodes, in list order.
    ///
    /// The walk ends at the sentinel or after `len()` nodes, whichever comes
    /// first. Every node must link back to the node before it; a repeated node
    /// always fails that check, so a corrupt list is `InvalidFormat` rather than
    /// a walk that revisits memory.
    pub fn node_addresses(&self) -> Result<Vec<u64>> {
        let sentinel = self.sentinel()?;
        let len = self.len()?;
        if sentinel == 0 {
            return Err(Error::invalid_format("std::list", "null sentinel node"));
        }
        let mut nodes = Vec::new();
        let mut prev = sentinel;
        let mut next = self.view.view_at_address(sentinel, Self::NODE_LINKS)?.read_pointer(0)?;
        while next != sentinel && (nodes.len() as u64) < len {
            if next == 0 {
                return Err(Error::invalid_format(
                    "std::list",
                    format!("null link after {} nodes", nodes.len()),
                ));
            }
            let node = self.view.view_at_address(next, Self::NODE_LINKS)?;
            let back = node.read_pointer(8)?;
            if back != prev {
                return Err(Error::invalid_format(
                    "std::list",
                    format!("node {next:#x} links back to {back:#x} instead of {prev:#x}"),
                ));
            }
            nodes.push(next);
            prev = next;
            next = node.read_pointer(0)?;
        }
        Ok(nodes)
    }

    /// The elements, stored inline in each node.
    pub fn elements<S: Shape>(&self) -> Result<Vec<S>> {
        self.node_addresses()?
            .into_iter()
            .map(|node| self.view.from_address(Self::payload(node)?))
            .collect()
    }

    /// The elements of a list of shared pointers: each payload starts with the
    /// address of the element.
    pub fn shared_elements<S: Shape>(&self) -> Result<Vec<S>> {
        self.node_addresses()?
            .into_iter()
            .map(|node| {
                self.view
                    .view_at_address(Self::payload(node)?, 8)?
                    .follow(0)
            })
            .collect()
    }

    fn payload(node: u64) -> Result<u64> {
        node.checked_add(Self::NODE_PAYLOAD as u64).ok_or_else(|| {
            Error::invalid_format("std::list", format!("node {node:#x} has no room for a payload"))
        })
    }
}

impl Shape for StdList {
    const SIZE: usize = 16;

    fn from_view(view: View) -> Self {
        StdList { view }
    }

    fn view(&self) -> &View {
        &self.view
    }

    fn into_view(self) -> View {
        self.view
    }
}
