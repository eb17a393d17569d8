use super::{NodeFlags, Pbvh, PbvhData};
use crate::mesh::{DynTopoMesh, FaceKey, FacesMesh, SubdivGrids, VertKey};
use crate::query::FrustumPlanes;
use crate::utils::parallel::{self, ParallelSettings};
use crate::utils::HashSet;

/// Opaque handle to the GPU resources of a leaf, allocated and freed by a [`DrawBackend`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct BatchHandle(pub u64);

/// The part of a leaf a draw backend fills its buffers from.
#[derive(Copy, Clone, Debug)]
pub enum GpuMeshArgs<'a> {
    /// A leaf of a flat mesh tree.
    Faces {
        /// The mesh.
        mesh: &'a FacesMesh,
        /// The triangles of the leaf.
        tris: &'a [u32],
        /// The vertices of the leaf, unique ones first.
        vert_indices: &'a [u32],
        /// The corners of each triangle of the leaf, as indices into `vert_indices`.
        face_vert_indices: &'a [[u32; 3]],
    },
    /// A leaf of a grids tree.
    Grids {
        /// The grids.
        grids: &'a SubdivGrids,
        /// The grids of the leaf.
        grid_indices: &'a [u32],
    },
    /// A leaf of a dynamic-topology tree.
    BMesh {
        /// The mesh.
        mesh: &'a DynTopoMesh,
        /// The faces of the leaf.
        faces: &'a HashSet<FaceKey>,
        /// The vertices owned by the leaf.
        unique_verts: &'a HashSet<VertKey>,
        /// The vertices used by the leaf but owned by another one.
        other_verts: &'a HashSet<VertKey>,
    },
}

/// Everything a [`DrawBackend`] gets to create or update the buffers of a leaf.
#[derive(Copy, Clone, Debug)]
pub struct GpuArgs<'a> {
    /// The leaf index.
    pub node: u32,
    /// The update generation the buffers are built for.
    pub updategen: u32,
    /// The geometry of the leaf.
    pub mesh: GpuMeshArgs<'a>,
    /// The name of the color attribute being edited, if any.
    pub active_color: Option<&'a str>,
    /// The name of the color attribute used for rendering, if any.
    pub render_color: Option<&'a str>,
    /// The vertex attributes the caller wants in the buffers.
    pub attrs: &'a [&'a str],
}

/// The GPU side of the tree.
///
/// The tree decides when buffers must be created, updated or freed; the backend owns the
/// actual resources.
pub trait DrawBackend {
    /// Creates the buffers of a leaf.
    ///
    /// When the leaf is also tagged with `UPDATE_DRAW_BUFFERS`, the new batch is filled by a
    /// [`DrawBackend::node_update`] call right after its creation.
    fn node_create(&mut self, args: &GpuArgs) -> BatchHandle;
    /// Refills existing buffers.
    fn node_update(&mut self, batch: BatchHandle, args: &GpuArgs);
    /// Called on every batch about to be updated, before any buffer is touched.
    fn update_pre(&mut self, batch: BatchHandle, args: &GpuArgs);
    /// Uploads the buffers updated since the last flush.
    fn node_gpu_flush(&mut self, batch: BatchHandle);
    /// Releases the buffers of a batch.
    fn node_free(&mut self, batch: BatchHandle);
}

enum BatchUpdate {
    Created(BatchHandle),
    Updated,
}

impl Pbvh {
    /// The draw arguments of a leaf.
    pub fn gpu_args<'a>(&'a self, node: u32, attrs: &'a [&'a str]) -> GpuArgs<'a> {
        let n = &self.nodes[node as usize];
        let updategen = if n.flag.contains(NodeFlags::UPDATE_DRAW_BUFFERS) {
            n.updategen.wrapping_add(1)
        } else {
            n.updategen
        };

        let (mesh, active_color, render_color) = match &self.data {
            PbvhData::Faces(mesh) => (
                GpuMeshArgs::Faces {
                    mesh,
                    tris: self.node_prim_indices(node),
                    vert_indices: &n.vert_indices,
                    face_vert_indices: &n.face_vert_indices,
                },
                mesh.active_color_attribute(),
                mesh.render_color_attribute(),
            ),
            PbvhData::Grids(grids) => (
                GpuMeshArgs::Grids {
                    grids,
                    grid_indices: self.node_prim_indices(node),
                },
                None,
                None,
            ),
            PbvhData::BMesh(data) => (
                GpuMeshArgs::BMesh {
                    mesh: &data.mesh,
                    faces: &n.bm_faces,
                    unique_verts: &n.bm_unique_verts,
                    other_verts: &n.bm_other_verts,
                },
                None,
                None,
            ),
        };

        GpuArgs {
            node,
            updategen,
            mesh,
            active_color,
            render_color,
            attrs,
        }
    }

    fn free_pending_batches(&mut self, backend: &mut impl DrawBackend) {
        for batch in self.pending_batch_frees.drain(..) {
            backend.node_free(batch);
        }
    }

    /// Creates or refreshes the buffers of the given leaves that are tagged with
    /// `REBUILD_DRAW_BUFFERS` or `UPDATE_DRAW_BUFFERS`.
    ///
    /// Leaves tagged for a rebuild lose their batch first. A recreated batch that is also
    /// tagged for an update is refilled right away. Both tags are cleared.
    pub fn update_draw_buffers(
        &mut self,
        backend: &mut impl DrawBackend,
        nodes: &[u32],
        attrs: &[&str],
    ) {
        self.free_pending_batches(backend);

        for node in nodes {
            let n = &mut self.nodes[*node as usize];
            if n.flag.contains(NodeFlags::REBUILD_DRAW_BUFFERS) {
                if let Some(batch) = n.draw_batches.take() {
                    backend.node_free(batch);
                }
            }
        }

        let to_update: Vec<u32> = nodes
            .iter()
            .copied()
            .filter(|node| {
                self.nodes[*node as usize]
                    .flag
                    .intersects(NodeFlags::REBUILD_DRAW_BUFFERS | NodeFlags::UPDATE_DRAW_BUFFERS)
            })
            .collect();

        let updates: Vec<(u32, Option<BatchUpdate>)> = {
            let this = &*self;
            let settings =
                ParallelSettings::for_nodes(self.options.use_threading, to_update.len());
            let args = parallel::map(&to_update, settings, |node| this.gpu_args(*node, attrs));

            for (node, args) in to_update.iter().zip(&args) {
                let n = &this.nodes[*node as usize];
                if let (Some(batch), false) = (
                    n.draw_batches,
                    n.flag.contains(NodeFlags::REBUILD_DRAW_BUFFERS),
                ) {
                    backend.update_pre(batch, args);
                }
            }

            to_update
                .iter()
                .zip(&args)
                .map(|(node, args)| {
                    let n = &this.nodes[*node as usize];
                    let update = if n.flag.contains(NodeFlags::REBUILD_DRAW_BUFFERS) {
                        let batch = backend.node_create(args);
                        if n.flag.contains(NodeFlags::UPDATE_DRAW_BUFFERS) {
                            backend.node_update(batch, args);
                        }
                        Some(BatchUpdate::Created(batch))
                    } else {
                        n.draw_batches.map(|batch| {
                            backend.node_update(batch, args);
                            BatchUpdate::Updated
                        })
                    };
                    (*node, update)
                })
                .collect()
        };

        for (node, update) in updates {
            let n = &mut self.nodes[node as usize];

            if let Some(BatchUpdate::Created(batch)) = update {
                n.draw_batches = Some(batch);
            }

            if n.flag.contains(NodeFlags::UPDATE_DRAW_BUFFERS) {
                n.updategen = n.updategen.wrapping_add(1);
                n.debug_draw_gen = n.debug_draw_gen.wrapping_add(1);

                if let Some(batch) = n.draw_batches {
                    backend.node_gpu_flush(batch);
                }
            }

            n.flag
                .remove(NodeFlags::REBUILD_DRAW_BUFFERS | NodeFlags::UPDATE_DRAW_BUFFERS);
        }
    }

    /// Updates the draw buffers, then calls `draw_fn` on every visible leaf inside
    /// `draw_frustum`.
    ///
    /// With `update_only_visible`, only the leaves inside `update_frustum` get their
    /// buffers updated; the others keep their tags for a later draw.
    pub fn draw(
        &mut self,
        backend: &mut impl DrawBackend,
        update_only_visible: bool,
        update_frustum: &FrustumPlanes,
        draw_frustum: &FrustumPlanes,
        attrs: &[&str],
        mut draw_fn: impl FnMut(u32, Option<BatchHandle>, &GpuArgs),
    ) {
        self.draw_cache_invalid = false;
        self.free_pending_batches(backend);

        let draw_flags = NodeFlags::REBUILD_DRAW_BUFFERS | NodeFlags::UPDATE_DRAW_BUFFERS;
        let to_update = if update_only_visible {
            self.search_gather(|node| update_frustum.contains_aabb(&node.vb))
        } else {
            self.search_gather(|node| !node.is_leaf() || node.flag.intersects(draw_flags))
        };

        let update_flag = to_update
            .iter()
            .fold(NodeFlags::empty(), |acc, node| acc | self.nodes[*node as usize].flag);

        if !to_update.is_empty() && update_flag.intersects(draw_flags) {
            self.update_draw_buffers(backend, &to_update, attrs);
        }

        for node in self.search_gather(|node| draw_frustum.contains_aabb(&node.vb)) {
            let n = &self.nodes[node as usize];
            if !n.fully_hidden() {
                draw_fn(node, n.draw_batches, &self.gpu_args(node, attrs));
            }
        }
    }

    /// Frees the draw buffers of every node.
    ///
    /// Every leaf is tagged for a rebuild, so the next draw creates its buffers again.
    pub fn free_draw_buffers(&mut self, backend: &mut impl DrawBackend) {
        self.free_pending_batches(backend);

        for node in &mut self.nodes {
            if let Some(batch) = node.draw_batches.take() {
                backend.node_free(batch);
            }

            if node.is_leaf() {
                node.mark_rebuild_draw();
            }
        }

        self.draw_cache_invalid = true;
    }
}
