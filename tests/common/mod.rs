// Shared fixture: a small history with blobs, nested trees, three commits
// and an annotated tag.

#![allow(dead_code)]

use oxipack::object::{Blob, Commit, ObjectGraph, ObjectHandle, Signature, Tag, Tree};

pub struct History {
    pub graph: ObjectGraph,
    pub b1: ObjectHandle,
    pub b2: ObjectHandle,
    pub b3: ObjectHandle,
    pub t1: ObjectHandle,
    pub t2: ObjectHandle,
    pub t3: ObjectHandle,
    pub c1: ObjectHandle,
    pub c2: ObjectHandle,
    pub c3: ObjectHandle,
    pub tag: ObjectHandle,
}

pub fn repeated_content() -> String {
    "test content/test content2/test content3\n".repeat(1000)
}

pub fn signature(name: &str, email: &str, seconds: i64) -> Signature {
    Signature::from_unix(name, email, seconds, 0).unwrap()
}

pub fn history() -> History {
    let mut graph = ObjectGraph::new();
    let text = repeated_content();
    let b1 = graph.insert(Blob::new(text.clone()));
    let b2 = graph.insert(Blob::new(text + "append"));
    let b3 = graph.insert(Blob::new("subdir test content\n"));

    let t1 = graph.insert(Tree::new().with("file-under-tree", b3).unwrap());
    let t2 = Tree::new()
        .with("some-file.txt", b2)
        .unwrap()
        .with("some-file2.txt", b1)
        .unwrap()
        .with("sub-directory.d", t1)
        .unwrap();
    let t2 = graph.insert(t2);
    let t3 = graph.insert(Tree::new().with("another-file.txt", b1).unwrap());

    let author = signature("Git Author", "author@git.com", 1_000_000);
    let c1 = graph.insert(Commit::new(t1, author.clone(), "Artificial commit 1"));
    let c2 = Commit::new(t2, signature("Git Author", "author@git.com", 2_000_000), "Artificial commit 2")
        .with_parent(c1);
    let c2 = graph.insert(c2);
    let c3 = Commit::new(t3, signature("Git User", "user@domain.com", 3_000_000), "Artificial commit 3")
        .with_parent(c2)
        .with_committer(signature("Git Commiter", "committer@git.com", 4_000_000));
    let c3 = graph.insert(c3);

    let tagger = signature("Git Tagger", "tagger@git.com", 2_000_000);
    let tag = graph.insert(Tag::new(c2, "v0.0.1", tagger, "Tag second commit"));

    History {
        graph,
        b1,
        b2,
        b3,
        t1,
        t2,
        t3,
        c1,
        c2,
        c3,
        tag,
    }
}
