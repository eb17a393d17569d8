use crate::{jittered_mesh, options};
use approx::assert_relative_eq;
use pbvh3d::math::{Point, Real, Vector};
use pbvh3d::mesh::FacesMesh;
use pbvh3d::partitioning::{NodeFlags, Pbvh};
use pbvh3d::query::{ray_face_intersection_tri, Ray, WatertightRayPrecalc};

fn brute_force_raycast(mesh: &FacesMesh, ray: &Ray) -> Option<(Real, usize)> {
    let precalc = WatertightRayPrecalc::new(&ray.dir);
    let positions = mesh.positions();
    let mut depth = Real::MAX;
    let mut face = None;

    for tri in 0..mesh.num_corner_tris() {
        let [a, b, c] = mesh.tri_verts(tri).map(|v| positions[v as usize]);
        if ray_face_intersection_tri(ray, &precalc, &a, &b, &c, &mut depth) {
            face = Some(mesh.tri_faces()[tri] as usize);
        }
    }

    face.map(|face| (depth, face))
}

fn random_ray(rng: &mut oorandom::Rand32, n: usize) -> Ray {
    let extent = n as f32 + 2.0;
    let origin = Point::new(
        (rng.rand_float() * extent - 1.0) as Real,
        (rng.rand_float() * extent - 1.0) as Real,
        3.0,
    );
    let dir = Vector::new(
        (rng.rand_float() - 0.5) as Real,
        (rng.rand_float() - 0.5) as Real,
        -1.0,
    );
    Ray::new(origin, dir)
}

#[test]
fn raycast_closest_matches_brute_force() {
    let n = 10;

    for seed in 0..5 {
        let mesh = jittered_mesh(seed, n, 2);
        let mut pbvh = Pbvh::build_mesh(mesh.clone(), options(6)).unwrap();
        let mut rng = oorandom::Rand32::new(seed + 100);
        let mut num_hits = 0;

        for _ in 0..200 {
            let ray = random_ray(&mut rng, n);
            let expected = brute_force_raycast(&mesh, &ray);
            let found = pbvh.raycast_closest(&ray, None);

            match (expected, found) {
                (Some((depth, face)), Some((found_depth, hit))) => {
                    num_hits += 1;
                    assert_relative_eq!(depth, found_depth);
                    assert_eq!(hit.active_face, Some(face));
                }
                (None, None) => {}
                (expected, found) => {
                    panic!("ray {:?}: expected {:?}, found {:?}", ray, expected, found)
                }
            }
        }

        assert!(num_hits > 0);
    }
}

#[test]
fn leaves_are_visited_by_increasing_entry_distance() {
    let n = 16;
    let mut pbvh = Pbvh::build_mesh(jittered_mesh(5, n, 1), options(4)).unwrap();
    let mut rng = oorandom::Rand32::new(42);

    for _ in 0..50 {
        // Grazing rays cross many leaf boxes.
        let origin = Point::new(-2.0, rng.rand_float() as Real * n as Real, 0.25);
        let dir = Vector::new(1.0, (rng.rand_float() - 0.5) as Real * 0.2, 0.0);
        let ray = Ray::new(origin, dir);

        let mut visited = vec![];
        pbvh.raycast(&ray, false, |pbvh, node, _| {
            visited.push(pbvh.node(node).tmin());
        });

        for pair in visited.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }
}

#[test]
fn raycast_on_original_coordinates_ignores_later_edits() {
    let mut pbvh = Pbvh::build_mesh(jittered_mesh(9, 8, 1), options(8)).unwrap();
    let original = pbvh.vert_coords_get();
    let ray = Ray::new(Point::new(4.3, 4.6, 3.0), Vector::new(0.0, 0.0, -1.0));

    let (before, _) = pbvh.raycast_closest(&ray, None).unwrap();

    // Lift the whole mesh by one unit without touching the original boxes.
    for p in pbvh.faces_mut().unwrap().positions_mut() {
        p.z += 1.0;
    }
    for leaf in pbvh.leaves() {
        pbvh.node_mut(leaf).mark_positions_update();
    }
    pbvh.update_bounds(NodeFlags::UPDATE_BB);

    let (after, _) = pbvh.raycast_closest(&ray, None).unwrap();
    let (on_original, _) = pbvh.raycast_closest(&ray, Some(&original[..])).unwrap();

    assert_relative_eq!(after, before - 1.0, epsilon = 1.0e-4);
    assert_relative_eq!(on_original, before, epsilon = 1.0e-4);
}
