use super::{DynTopoData, Pbvh, PbvhData, PbvhNode};
use crate::bounding_volume::Aabb;
use crate::math::{Point, Real, Vector};
use crate::mesh::{paint_is_grid_face_hidden, VertKey};
use crate::query::{
    ray_face_intersection_quad, ray_face_intersection_tri, ray_face_nearest_quad,
    ray_face_nearest_tri, test_frustum_aabb, DistRayAabbPrecalc, FrustumPlanes,
    PlaneAabbIntersection, Ray, RayAabbPrecalc, WatertightRayPrecalc,
};
use crate::utils::{ccw_face_normal, ccw_quad_normal};

/// The primitive under a ray, as reported by [`Pbvh::raycast_node`].
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RaycastHit {
    /// The vertex of the hit primitive closest to the hit point.
    ///
    /// A mesh vertex, a flat grid sample index, or a dynamic vertex key.
    pub active_vertex: Option<usize>,
    /// The hit base face, or dynamic face key.
    pub active_face: Option<usize>,
    /// The hit grid, for grids trees.
    pub active_grid: Option<usize>,
    /// The normal of the hit triangle or quad.
    pub face_normal: Vector<Real>,
}

fn nearest_corner<const N: usize>(location: &Point<Real>, co: &[Point<Real>; N]) -> usize {
    let mut best = 0;
    for j in 1..N {
        if na::distance_squared(location, &co[j]) < na::distance_squared(location, &co[best]) {
            best = j;
        }
    }
    best
}

fn node_aabb(node: &PbvhNode, original: bool) -> &Aabb {
    if original {
        &node.orig_vb
    } else {
        &node.vb
    }
}

/// The position of a dynamic vertex, read from `original` when given.
fn dyn_vert_co(
    data: &DynTopoData,
    original: Option<&[Point<Real>]>,
    vert: VertKey,
) -> Option<Point<Real>> {
    match original {
        Some(coords) => coords.get(vert).copied(),
        None => data.mesh.vert(vert).map(|v| v.co),
    }
}

impl Pbvh {
    /// Visits the leaves whose box is hit by `ray`, from the nearest to the farthest.
    ///
    /// The entry distance of each leaf is stored in its `tmin`. `hit_fn` gets the running
    /// closest distance, which it should lower whenever it finds a closer hit.
    pub fn raycast(
        &mut self,
        ray: &Ray,
        original: bool,
        hit_fn: impl FnMut(&Pbvh, u32, &mut Real),
    ) {
        let precalc = RayAabbPrecalc::new(ray);

        self.search_callback_occluded(
            |node| {
                let bb = node_aabb(node, original);
                if !bb.is_valid() {
                    return false;
                }

                match precalc.intersect(bb) {
                    Some(tmin) => {
                        node.tmin = tmin;
                        true
                    }
                    None => false,
                }
            },
            hit_fn,
        );
    }

    /// Intersects `ray` with the visible primitives of a leaf.
    ///
    /// `depth` is lowered to the closest hit distance and `hit` describes the hit
    /// primitive. `original`, when given, is a snapshot of the vertex positions indexed
    /// like [`Self::vert_coords_get`], used instead of the current positions.
    pub fn raycast_node(
        &self,
        node: u32,
        ray: &Ray,
        precalc: &WatertightRayPrecalc,
        original: Option<&[Point<Real>]>,
        depth: &mut Real,
        hit: &mut RaycastHit,
    ) -> bool {
        let n = &self.nodes[node as usize];

        if n.fully_hidden() {
            return false;
        }

        let mut result = false;

        match &self.data {
            PbvhData::Faces(mesh) => {
                let coords = original.unwrap_or(mesh.positions());

                for tri in self.node_prim_indices(node) {
                    let face = mesh.tri_faces()[*tri as usize] as usize;
                    if mesh.is_face_hidden(face) {
                        continue;
                    }

                    let verts = mesh.tri_verts(*tri as usize);
                    let co = verts.map(|v| coords[v as usize]);

                    if ray_face_intersection_tri(ray, precalc, &co[0], &co[1], &co[2], depth) {
                        result = true;
                        hit.face_normal = ccw_face_normal([&co[0], &co[1], &co[2]]);

                        let location = ray.point_at(*depth);
                        hit.active_vertex = Some(verts[nearest_corner(&location, &co)] as usize);
                        hit.active_face = Some(face);
                    }
                }
            }
            PbvhData::Grids(grids) => {
                let coords = original.unwrap_or(grids.positions());
                let gs = grids.key().grid_size as usize;

                for grid in self.node_prim_indices(node) {
                    let grid = *grid as usize;
                    let gh = grids.grid_hidden_of(grid);

                    for y in 0..gs - 1 {
                        for x in 0..gs - 1 {
                            if gh.is_some_and(|gh| paint_is_grid_face_hidden(gh, gs, x, y)) {
                                continue;
                            }

                            let samples = grids.quad_sample_indices(grid, x, y);
                            let co = samples.map(|i| coords[i]);

                            if ray_face_intersection_quad(
                                ray, precalc, &co[0], &co[1], &co[2], &co[3], depth,
                            ) {
                                result = true;
                                hit.face_normal = ccw_quad_normal([&co[3], &co[2], &co[1], &co[0]]);

                                let location = ray.point_at(*depth);
                                hit.active_vertex = Some(samples[nearest_corner(&location, &co)]);
                                hit.active_grid = Some(grid);
                                hit.active_face = Some(grids.grid_to_face_map()[grid] as usize);
                            }
                        }
                    }
                }
            }
            PbvhData::BMesh(data) => {
                for face_key in &n.bm_faces {
                    let Some(face) = data.mesh.face(*face_key) else {
                        continue;
                    };
                    if face.hidden {
                        continue;
                    }

                    let verts = face.verts();
                    let [Some(a), Some(b), Some(c)] =
                        verts.map(|v| dyn_vert_co(data, original, v))
                    else {
                        continue;
                    };
                    let co = [a, b, c];

                    if ray_face_intersection_tri(ray, precalc, &a, &b, &c, depth) {
                        result = true;
                        hit.face_normal = ccw_face_normal([&a, &b, &c]);

                        let location = ray.point_at(*depth);
                        hit.active_vertex = Some(verts[nearest_corner(&location, &co)]);
                        hit.active_face = Some(*face_key);
                    }
                }
            }
        }

        result
    }

    /// Casts `ray` through the whole tree and returns the closest hit distance together
    /// with the hit primitive.
    pub fn raycast_closest(
        &mut self,
        ray: &Ray,
        original: Option<&[Point<Real>]>,
    ) -> Option<(Real, RaycastHit)> {
        let precalc = WatertightRayPrecalc::new(&ray.dir);
        let mut hit = RaycastHit::default();
        let mut closest = None;

        self.raycast(ray, original.is_some(), |pbvh, node, tmin| {
            if pbvh.node(node).tmin >= *tmin {
                return;
            }

            if pbvh.raycast_node(node, ray, &precalc, original, tmin, &mut hit) {
                closest = Some(*tmin);
            }
        });

        closest.map(|depth| (depth, hit))
    }

    /// Moves the ends of an orthographic view ray to where it enters and leaves the
    /// (slightly expanded) root box.
    ///
    /// The ends are left untouched if the tree is empty or `dir` is zero. If the ray misses
    /// the root box, the ends are only pulled onto the sphere bounding it.
    pub fn clip_ray_ortho(
        &self,
        original: bool,
        start: &mut Point<Real>,
        end: &mut Point<Real>,
        dir: &Vector<Real>,
    ) {
        let Some(root) = self.nodes.first() else {
            return;
        };
        let bb = *node_aabb(root, original);
        let Some(dir) = dir.try_normalize(0.0) else {
            return;
        };

        if !bb.is_valid() {
            return;
        }

        let center = bb.center();
        let half = (bb.half_extents() + Vector::repeat(1.0e-3)) * (1.0 + 1.0e-3);
        let expanded = Aabb::from_half_extents(center, half);

        // Rough clip around the projection of the box center onto the ray line.
        let seg = *end - *start;
        let len_sq = seg.norm_squared();
        let t = if len_sq > 0.0 {
            (center - *start).dot(&seg) / len_sq
        } else {
            0.0
        };
        let cent = *start + seg * t;
        let dist = half.norm();
        *start = cent - dir * dist;
        *end = cent + dir * dist;

        let Some(mut tstart) =
            RayAabbPrecalc::new(&Ray::new(*start, dir)).intersect(&expanded)
        else {
            return;
        };
        let Some(mut tend) = RayAabbPrecalc::new(&Ray::new(*end, -dir)).intersect(&expanded) else {
            return;
        };

        if tstart == tend {
            let eps = tstart.abs().max(1.0) * Real::EPSILON * 5000.0;
            tstart -= eps;
            tend += eps;
        }

        *start += dir * tstart;
        *end -= dir * tend;
    }

    /// Visits the leaves whose box is close to the `ray` line, from the closest to the
    /// farthest.
    ///
    /// The squared distance between the ray and each leaf box is stored in its `tmin`.
    /// Boxes entirely behind the ray origin are skipped.
    pub fn find_nearest_to_ray(
        &mut self,
        ray: &Ray,
        original: bool,
        hit_fn: impl FnMut(&Pbvh, u32, &mut Real),
    ) {
        let precalc = DistRayAabbPrecalc::new(ray);

        self.search_callback_occluded(
            |node| {
                let bb = node_aabb(node, original);
                if !bb.is_valid() {
                    return false;
                }

                let dist = precalc.dist_squared(bb);
                node.tmin = dist.dist_sq;
                dist.depth > 0.0
            },
            hit_fn,
        );
    }

    /// Finds the visible primitive of a leaf closest to the `ray` line.
    ///
    /// `dist_sq` is lowered to the closest squared distance, and `depth` set to the
    /// distance along the ray of the closest point.
    pub fn find_nearest_to_ray_node(
        &self,
        node: u32,
        ray: &Ray,
        original: Option<&[Point<Real>]>,
        depth: &mut Real,
        dist_sq: &mut Real,
    ) -> bool {
        let n = &self.nodes[node as usize];

        if n.fully_hidden() {
            return false;
        }

        let mut result = false;

        match &self.data {
            PbvhData::Faces(mesh) => {
                let coords = original.unwrap_or(mesh.positions());

                for tri in self.node_prim_indices(node) {
                    if mesh.is_face_hidden(mesh.tri_faces()[*tri as usize] as usize) {
                        continue;
                    }

                    let [a, b, c] = mesh.tri_verts(*tri as usize).map(|v| &coords[v as usize]);
                    result |= ray_face_nearest_tri(ray, a, b, c, depth, dist_sq);
                }
            }
            PbvhData::Grids(grids) => {
                let coords = original.unwrap_or(grids.positions());
                let key = grids.key();
                let gs = key.grid_size as usize;

                for grid in self.node_prim_indices(node) {
                    let grid = *grid as usize;
                    let gh = grids.grid_hidden_of(grid);

                    for y in 0..gs - 1 {
                        for x in 0..gs - 1 {
                            if gh.is_some_and(|gh| paint_is_grid_face_hidden(gh, gs, x, y)) {
                                continue;
                            }

                            let [a, b, c, d] = [(x, y), (x + 1, y), (x + 1, y + 1), (x, y + 1)]
                                .map(|(sx, sy)| &coords[key.sample_index(grid, sx, sy)]);
                            result |= ray_face_nearest_quad(ray, a, b, c, d, depth, dist_sq);
                        }
                    }
                }
            }
            PbvhData::BMesh(data) => {
                for face_key in &n.bm_faces {
                    let Some(face) = data.mesh.face(*face_key) else {
                        continue;
                    };
                    if face.hidden {
                        continue;
                    }

                    let [Some(a), Some(b), Some(c)] =
                        face.verts().map(|v| dyn_vert_co(data, original, v))
                    else {
                        continue;
                    };
                    result |= ray_face_nearest_tri(ray, &a, &b, &c, depth, dist_sq);
                }
            }
        }

        result
    }

    /// The closest visible primitive to the `ray` line over the whole tree, as
    /// `(depth, dist_sq)`.
    pub fn nearest_to_ray_closest(
        &mut self,
        ray: &Ray,
        original: Option<&[Point<Real>]>,
    ) -> Option<(Real, Real)> {
        let mut depth = 0.0;
        let mut dist_sq = Real::MAX;
        let mut found = false;

        self.find_nearest_to_ray(ray, original.is_some(), |pbvh, node, tmin| {
            if pbvh.node(node).tmin >= *tmin {
                return;
            }

            if pbvh.find_nearest_to_ray_node(node, ray, original, &mut depth, &mut dist_sq) {
                *tmin = dist_sq;
                found = true;
            }
        });

        found.then_some((depth, dist_sq))
    }

    /// Is the box of `node` at least partially inside `planes`?
    pub fn node_frustum_contain_aabb(&self, node: u32, planes: &FrustumPlanes) -> bool {
        test_frustum_aabb(&self.nodes[node as usize].vb, planes) != PlaneAabbIntersection::Outside
    }

    /// Is the box of `node` at least partially outside `planes`?
    pub fn node_frustum_exclude_aabb(&self, node: u32, planes: &FrustumPlanes) -> bool {
        test_frustum_aabb(&self.nodes[node as usize].vb, planes) != PlaneAabbIntersection::Inside
    }
}
