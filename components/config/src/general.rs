use crate::util;

crate::section! {
    #[serde(default)]
    pub struct General {
        /// ID of the running instance, just keep it at 0 if using one instance
        pub instance_id: u16 = 0 => "LANTERN_INSTANCE_ID" | util::parse[0u16],

        /// Name used to identify this node in logs
        pub node_name: String = "keeper".to_owned() => "LANTERN_NODE_NAME",
    }

    impl Extra {
        fn configure(&mut self) {
            if self.node_name.trim().is_empty() {
                self.node_name = format!("keeper-{}", self.instance_id);

                tracing::info!("Setting node name to {}", self.node_name);
            }
        }
    }
}
