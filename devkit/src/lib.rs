/*!
# pimon DevKit - Stubs et utilitaires de test

Bibliothèque partagée par les tests du kernel:
- Faux serveur d'inférence (upstream) avec réponses scriptées
- Constructeurs de payloads aux formats acceptés par le proxy chat
- Fixtures SQLite (base temporaire, ancien schéma sans colonne `model`)
*/

pub mod upstream_stub;
pub mod test_utils;

pub use upstream_stub::{closed_port_url, MockUpstream, StubReply, UpstreamPayloads};
pub use test_utils::{init_test_logging, StoreFixture};
