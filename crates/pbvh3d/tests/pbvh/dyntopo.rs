use crate::{jittered_dyntopo, options};
use pbvh3d::math::{Point, Real, Vector};
use pbvh3d::mesh::{DynTopoError, FaceKey};
use pbvh3d::partitioning::{NodeFlags, Pbvh};

fn live_faces(pbvh: &Pbvh) -> Vec<FaceKey> {
    pbvh.dyntopo()
        .unwrap()
        .faces()
        .map(|(key, _)| key)
        .collect()
}

fn refit_and_check(pbvh: &mut Pbvh) {
    pbvh.update_bounds(NodeFlags::UPDATE_BB | NodeFlags::UPDATE_ORIGINAL_BB);
    pbvh.update_normals();
    pbvh.assert_well_formed();
}

#[test]
fn random_edits_keep_the_tree_well_formed() {
    for seed in 0..6 {
        let mut pbvh = Pbvh::build_bmesh(jittered_dyntopo(seed, 8), options(10)).unwrap();
        pbvh.assert_well_formed();

        let mut rng = oorandom::Rand32::new(seed * 31 + 1);

        for step in 0..300 {
            let faces = live_faces(&pbvh);

            match rng.rand_range(0..3) {
                0 if !faces.is_empty() => {
                    let face = faces[rng.rand_range(0..faces.len() as u32) as usize];
                    pbvh.bmesh_remove_face(face).unwrap();
                }
                1 if !faces.is_empty() => {
                    // Grow a new triangle off one edge of an existing one.
                    let face = faces[rng.rand_range(0..faces.len() as u32) as usize];
                    let [a, b, _] = pbvh.dyntopo().unwrap().face(face).unwrap().verts();
                    let base = pbvh.dyntopo().unwrap().vert(a).unwrap().co;
                    let offset = rng.rand_float() as Real;
                    let c = pbvh
                        .bmesh_add_vert(base + Vector::new(offset, 0.5, 0.25))
                        .unwrap();
                    let _ = pbvh.bmesh_add_face([a, b, c]).unwrap();
                }
                _ => {
                    // A floating triangle, somewhere over the mesh.
                    let x = rng.rand_float() as Real * 8.0;
                    let y = rng.rand_float() as Real * 8.0;
                    let verts = [
                        Point::new(x, y, 1.0),
                        Point::new(x + 0.5, y, 1.0),
                        Point::new(x, y + 0.5, 1.0),
                    ]
                    .map(|co| pbvh.bmesh_add_vert(co).unwrap());
                    let _ = pbvh.bmesh_add_face(verts).unwrap();
                }
            }

            if step % 25 == 0 {
                refit_and_check(&mut pbvh);
            }
        }

        refit_and_check(&mut pbvh);
    }
}

#[test]
fn removing_every_face_releases_every_vertex() {
    let mut pbvh = Pbvh::build_bmesh(jittered_dyntopo(3, 6), options(5)).unwrap();

    for face in live_faces(&pbvh) {
        pbvh.bmesh_remove_face(face).unwrap();
    }

    for leaf in pbvh.leaves() {
        let node = pbvh.node(leaf);
        assert!(node.bm_faces().is_empty());
        assert!(node.bm_unique_verts().is_empty());
        assert!(node.bm_other_verts().is_empty());
    }

    assert_eq!(pbvh.dyntopo().unwrap().num_faces(), 0);
    pbvh.assert_well_formed();
}

#[test]
fn invalid_edits_are_rejected() {
    let mut pbvh = Pbvh::build_bmesh(jittered_dyntopo(1, 2), options(4)).unwrap();
    let v = pbvh.bmesh_add_vert(Point::origin()).unwrap();

    assert_eq!(
        pbvh.bmesh_add_face([v, v, 0]),
        Err(DynTopoError::DegenerateFace { verts: [v, v, 0] })
    );
    assert_eq!(
        pbvh.bmesh_add_face([v, 0, 1000]),
        Err(DynTopoError::InvalidVertex { vert: 1000 })
    );
    assert_eq!(
        pbvh.bmesh_remove_face(1000),
        Err(DynTopoError::InvalidFace { face: 1000 })
    );

    pbvh.assert_well_formed();
}
