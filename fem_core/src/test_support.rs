//! Small models shared by unit tests.

use crate::document::ModelDocument;
use crate::model::{
    Activation, Elastic, ElasticSection, Element, Load, Material, NodalLoad, Node, Section, Stage, StaticAnalysis,
    Truss,
};

/// Two-bar planar truss: nodes 1-2-3 along x, node 1 pinned.
pub(crate) fn truss_document() -> ModelDocument {
    let mut doc = ModelDocument::new();
    doc.add(Material::new(1, Elastic { e: 200e9 }).unwrap().with_name("steel"))
        .unwrap();
    let section = ElasticSection {
        e: 200e9,
        a: 0.01,
        iz: 8.33e-6,
        iy: None,
        g: None,
        j: None,
    };
    doc.add(Section::new(1, section).unwrap()).unwrap();
    doc.add(
        Node::new(1, vec![0.0, 0.0])
            .unwrap()
            .with_fixed_dofs(vec![true, true, false, false]),
    )
    .unwrap();
    doc.add(Node::new(2, vec![2.0, 0.0]).unwrap()).unwrap();
    doc.add(Node::new(3, vec![4.0, 0.0]).unwrap()).unwrap();
    doc.add(Element::new(1, Truss { area: 0.01 }, vec![1, 2], 1, 1).unwrap())
        .unwrap();
    doc.add(Element::new(2, Truss { area: 0.01 }, vec![2, 3], 1, 1).unwrap())
        .unwrap();
    doc
}

/// [`truss_document`] with a load on node 3, a base stage applying it, and a
/// second stage that adds node 4 and a third bar.
pub(crate) fn staged_truss_document() -> ModelDocument {
    let mut doc = truss_document();
    doc.add(Load::new(1, NodalLoad { values: vec![0.0, -1000.0, 0.0] }, 3).unwrap())
        .unwrap();
    doc.add(Node::new(4, vec![6.0, 0.0]).unwrap()).unwrap();
    doc.add(Element::new(3, Truss { area: 0.01 }, vec![3, 4], 1, 1).unwrap())
        .unwrap();
    doc.add(Load::new(2, NodalLoad { values: vec![0.0, -500.0, 0.0] }, 4).unwrap())
        .unwrap();

    doc.add(
        Stage::new(1, StaticAnalysis::default())
            .unwrap()
            .with_name("self weight")
            .with_loads(vec![1]),
    )
    .unwrap();
    doc.add(
        Stage::new(2, StaticAnalysis { steps: 5, ..StaticAnalysis::default() })
            .unwrap()
            .with_name("extension")
            .with_loads(vec![2])
            .activating(Activation {
                nodes: vec![4],
                elements: vec![3],
                constraints: Vec::new(),
            }),
    )
    .unwrap();
    doc
}
