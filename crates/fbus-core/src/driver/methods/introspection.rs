//! Static introspection documents.
//!
//! Five documents cover the whole object tree: the full interface listing
//! at the canonical path, node pointers along `/org/freedesktop/DBus`, and
//! an empty node for everything else. The exact bytes are part of the wire
//! contract; clients diff them against the reference broker.

/// `/org/freedesktop/DBus` — the complete interface listing.
pub(crate) const DRIVER: &str =
    "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\
     \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n\
     <node>\n\
    \x20 <interface name=\"org.freedesktop.DBus\">\n\
    \x20   <method name=\"Hello\">\n\
    \x20     <arg direction=\"out\" type=\"s\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"RequestName\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"in\" type=\"u\"/>\n\
    \x20     <arg direction=\"out\" type=\"u\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"ReleaseName\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"u\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"StartServiceByName\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"in\" type=\"u\"/>\n\
    \x20     <arg direction=\"out\" type=\"u\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"UpdateActivationEnvironment\">\n\
    \x20     <arg direction=\"in\" type=\"a{ss}\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"NameHasOwner\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"b\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"ListNames\">\n\
    \x20     <arg direction=\"out\" type=\"as\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"ListActivatableNames\">\n\
    \x20     <arg direction=\"out\" type=\"as\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"AddMatch\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"RemoveMatch\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"GetNameOwner\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"s\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"ListQueuedOwners\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"as\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"GetConnectionUnixUser\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"u\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"GetConnectionUnixProcessID\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"u\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"GetAdtAuditSessionData\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"ay\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"GetConnectionSELinuxSecurityContext\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"ay\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"ReloadConfig\">\n\
    \x20   </method>\n\
    \x20   <method name=\"GetId\">\n\
    \x20     <arg direction=\"out\" type=\"s\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"GetConnectionCredentials\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"a{sv}\"/>\n\
    \x20   </method>\n\
    \x20   <property name=\"Features\" type=\"as\" access=\"read\">\n\
    \x20     <annotation name=\"org.freedesktop.DBus.Property.EmitsChangedSignal\" value=\"const\"/>\n\
    \x20   </property>\n\
    \x20   <property name=\"Interfaces\" type=\"as\" access=\"read\">\n\
    \x20     <annotation name=\"org.freedesktop.DBus.Property.EmitsChangedSignal\" value=\"const\"/>\n\
    \x20   </property>\n\
    \x20   <signal name=\"NameOwnerChanged\">\n\
    \x20     <arg type=\"s\"/>\n\
    \x20     <arg type=\"s\"/>\n\
    \x20     <arg type=\"s\"/>\n\
    \x20   </signal>\n\
    \x20   <signal name=\"NameLost\">\n\
    \x20     <arg type=\"s\"/>\n\
    \x20   </signal>\n\
    \x20   <signal name=\"NameAcquired\">\n\
    \x20     <arg type=\"s\"/>\n\
    \x20   </signal>\n\
    \x20 </interface>\n\
    \x20 <interface name=\"org.freedesktop.DBus.Properties\">\n\
    \x20   <method name=\"Get\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"v\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"GetAll\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"out\" type=\"a{sv}\"/>\n\
    \x20   </method>\n\
    \x20   <method name=\"Set\">\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"in\" type=\"s\"/>\n\
    \x20     <arg direction=\"in\" type=\"v\"/>\n\
    \x20   </method>\n\
    \x20   <signal name=\"PropertiesChanged\">\n\
    \x20     <arg type=\"s\" name=\"interface_name\"/>\n\
    \x20     <arg type=\"a{sv}\" name=\"changed_properties\"/>\n\
    \x20     <arg type=\"as\" name=\"invalidated_properties\"/>\n\
    \x20   </signal>\n\
    \x20 </interface>\n\
    \x20 <interface name=\"org.freedesktop.DBus.Introspectable\">\n\
    \x20   <method name=\"Introspect\">\n\
    \x20     <arg direction=\"out\" type=\"s\"/>\n\
    \x20   </method>\n\
    \x20 </interface>\n\
    \x20 <interface name=\"org.freedesktop.DBus.Monitoring\">\n\
    \x20   <method name=\"BecomeMonitor\">\n\
    \x20     <arg direction=\"in\" type=\"as\"/>\n\
    \x20     <arg direction=\"in\" type=\"u\"/>\n\
    \x20   </method>\n\
    \x20 </interface>\n\
    \x20 <interface name=\"org.freedesktop.DBus.Peer\">\n\
    \x20   <method name=\"GetMachineId\">\n\
    \x20     <arg direction=\"out\" type=\"s\"/>\n\
    \x20   </method>\n\
    \x20     <method name=\"Ping\">\n\
    \x20   </method>\n\
    \x20 </interface>\n\
     </node>\n";

/// `/org/freedesktop` — pointer to the `DBus` node.
pub(crate) const ORG_FREEDESKTOP: &str =
    "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\
     \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n\
     <node>\n\
    \x20 <node name=\"DBus\"/>\n\
     </node>\n";

/// `/org` — pointer to `freedesktop/DBus`.
pub(crate) const ORG: &str =
    "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\
     \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n\
     <node>\n\
    \x20 <node name=\"freedesktop/DBus\"/>\n\
     </node>\n";

/// `/` — pointer to `org/freedesktop/DBus`.
pub(crate) const ROOT: &str =
    "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\
     \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n\
     <node>\n\
    \x20 <node name=\"org/freedesktop/DBus\"/>\n\
     </node>\n";

/// Any other path — an empty node.
pub(crate) const EMPTY: &str =
    "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\
     \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n\
     <node>\n\
     </node>\n";
