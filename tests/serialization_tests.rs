#![cfg(feature = "serialization")] // Only compile this test module if "serialization" is enabled

use tensor_edges::{Array, Edge, Error};

#[test]
fn test_array_json_round_trip() -> Result<(), Error> {
    let original = Array::from_vec(vec![1.0, -2.5, 3.0, 4.25, 0.0, 6.0], &[2, 3])?;
    let json = serde_json::to_string(&original).expect("serialize array");
    let restored: Array = serde_json::from_str(&json).expect("deserialize array");
    assert_eq!(restored, original);
    Ok(())
}

#[test]
fn test_edge_configuration_survives_serialization() {
    let edges = vec![
        Edge::Tanh,
        Edge::OneMinusX { c: 0.5 },
        Edge::KMHNGram { n: 3 },
        Edge::Reshape { to: vec![4, 2] },
        Edge::RestrictedLogSoftmax { denom: vec![0, 3, 5] },
        Edge::Hinge {
            correct: 2,
            margin: 0.75,
        },
        Edge::Dropout { p: 0.8 },
    ];
    for edge in edges {
        let json = serde_json::to_string(&edge).expect("serialize edge");
        let restored: Edge = serde_json::from_str(&json).expect("deserialize edge");
        assert_eq!(restored, edge, "json was {}", json);
    }
}

#[test]
fn test_restored_edge_computes_same_output() -> Result<(), Error> {
    let edge = Edge::MaxPooling1D { width: 2 };
    let restored: Edge =
        serde_json::from_str(&serde_json::to_string(&edge).expect("serialize edge"))
            .expect("deserialize edge");
    let x = Array::column(vec![1.0, 5.0, 2.0, 4.0]);
    assert_eq!(restored.forward(&[&x])?, edge.forward(&[&x])?);
    Ok(())
}

#[test]
fn test_unknown_edge_is_rejected() {
    let result: Result<Edge, _> = serde_json::from_str("\"Convolution\"");
    assert!(result.is_err());
}
