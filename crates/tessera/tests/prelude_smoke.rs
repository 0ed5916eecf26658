//! The prelude is enough to declare, wire and render a component.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Value as Json, json};
use tessera::prelude::*;

struct Static(Json);

impl WireAdapter for Static {
    fn connect(&mut self, _config: &Json, sink: WireSink) -> tessera::runtime::Result<()> {
        sink.emit(&self.0).map(drop)
    }
}

#[test]
fn declare_wire_and_render() {
    let class = ComponentClass::extending_base("Profile")
        .public_prop("userId", PropDecl::inferred())
        .observed_attributes(["title"])
        .decorate("user", || wire("user", Some(json!({ "id": "$userId" }))))
        .expect("declaration-time wire")
        .build();
    let def = get_component_def(&class).expect("valid definition");
    assert!(def.observed_attrs().contains("title"));

    let runtime = Runtime::new();
    runtime.register_adapter("user", || Static(json!({ "name": "Ada" })));

    let names = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&names);
    let el = runtime
        .create_element(
            "x-profile",
            &class,
            Behavior::new().with_render(move |el| {
                if let Value::Proxy(user) = el.get("user")? {
                    seen.borrow_mut().push(user.get("name"));
                }
                Ok(())
            }),
        )
        .expect("element");
    el.connect().expect("connect");
    assert_eq!(*names.borrow(), [Value::from("Ada")]);
    assert_eq!(el.lifecycle(), Lifecycle::Connected);
}
