use pbvh3d::math::{Point, Real};
use pbvh3d::mesh::{DynTopoMesh, FacesMesh};
use pbvh3d::partitioning::PbvhBuildOptions;

mod build;
mod dyntopo;
mod raycast;

pub fn options(leaf_limit: usize) -> PbvhBuildOptions {
    PbvhBuildOptions {
        leaf_limit,
        bmesh_leaf_limit: leaf_limit,
        use_threading: true,
    }
}

/// `(n + 1)^2` vertices on a unit-spaced grid with a random height.
pub fn jittered_positions(rng: &mut oorandom::Rand32, n: usize) -> Vec<Point<Real>> {
    (0..=n)
        .flat_map(|j| (0..=n).map(move |i| (i, j)))
        .map(|(i, j)| Point::new(i as Real, j as Real, rng.rand_float() as Real * 0.5))
        .collect()
}

/// An `n * n` quad grid where every other quad is split into two triangles, with random
/// heights and random materials among `num_materials`.
pub fn jittered_mesh(seed: u64, n: usize, num_materials: u32) -> FacesMesh {
    let mut rng = oorandom::Rand32::new(seed);
    let positions = jittered_positions(&mut rng, n);
    let row = n as u32 + 1;

    let mut face_offsets = vec![0];
    let mut corner_verts = vec![];
    for j in 0..n as u32 {
        for i in 0..n as u32 {
            let v0 = j * row + i;
            let quad = [v0, v0 + 1, v0 + row + 1, v0 + row];

            if (i + j) % 2 == 0 {
                corner_verts.extend_from_slice(&quad);
                face_offsets.push(corner_verts.len() as u32);
            } else {
                for tri in [[quad[0], quad[1], quad[2]], [quad[0], quad[2], quad[3]]] {
                    corner_verts.extend_from_slice(&tri);
                    face_offsets.push(corner_verts.len() as u32);
                }
            }
        }
    }

    let num_faces = face_offsets.len() - 1;
    let materials = (0..num_faces)
        .map(|_| rng.rand_range(0..num_materials) as i32)
        .collect();

    FacesMesh::new(positions, face_offsets, corner_verts)
        .unwrap()
        .with_material_indices(materials)
        .unwrap()
}

/// The triangles of an `n * n` jittered grid, as a dynamic-topology mesh.
pub fn jittered_dyntopo(seed: u64, n: usize) -> DynTopoMesh {
    let mut rng = oorandom::Rand32::new(seed);
    let positions = jittered_positions(&mut rng, n);
    let row = n as u32 + 1;

    let triangles: Vec<_> = (0..n as u32)
        .flat_map(|j| (0..n as u32).map(move |i| j * row + i))
        .flat_map(|v0| [[v0, v0 + 1, v0 + row + 1], [v0, v0 + row + 1, v0 + row]])
        .collect();

    DynTopoMesh::from_triangles(&positions, &triangles).unwrap()
}
